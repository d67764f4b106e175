use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use teammate_recommender::Result;
use teammate_recommender::commands::{
    build_index, delete_all, delete_record, get_record, health, recommend, seed, set_hackathon,
    set_participant, show_status,
};
use teammate_recommender::config::{Config, get_config_dir, run_interactive_config, show_config};
use teammate_recommender::database::Collection;
use teammate_recommender::recommender::Strategy;

#[derive(Parser)]
#[command(name = "teammate-recommender")]
#[command(about = "Recommends complementary hackathon teammates from skill embeddings")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the default vector store
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ParticipantProfile {
    /// Skills to embed, comma separated or repeated
    #[arg(long, value_delimiter = ',')]
    skills: Vec<String>,
    /// Precomputed embedding, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    vector: Option<Vec<f32>>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct HackathonProfile {
    /// Skills to embed, comma separated or repeated
    #[arg(long, value_delimiter = ',')]
    skills: Vec<String>,
    /// JSON document describing the hackathon; skills are suggested from it
    #[arg(long)]
    document: Option<PathBuf>,
    /// Precomputed embedding, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    vector: Option<Vec<f32>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the vector store, recommendations and Ollama
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Store a participant's skill profile
    Participant {
        id: String,
        #[command(flatten)]
        profile: ParticipantProfile,
    },
    /// Store a hackathon's target skill profile
    Hackathon {
        id: String,
        #[command(flatten)]
        profile: HackathonProfile,
    },
    /// Load records from a JSON Lines file
    Seed {
        collection: Collection,
        file: PathBuf,
        /// Bulk append without replacing existing ids
        #[arg(long)]
        append: bool,
    },
    /// Recommend teammates for a participant at a hackathon
    Recommend {
        participant: String,
        hackathon: String,
        /// Number of teammates to return
        #[arg(long, allow_negative_numbers = true)]
        top_k: Option<i64>,
        /// Ranking strategy: gap or team
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a stored record
    Get { collection: Collection, id: String },
    /// Delete a stored record
    Delete { collection: Collection, id: String },
    /// Delete every record of a collection
    DeleteAll { collection: String },
    /// Build the vector index for a collection
    Index { collection: Collection },
    /// Show store and embedding backend status
    Status,
    /// Check that Ollama and its models are available
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(anyhow::Error::from)?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load(&config_dir)?)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Participant { id, profile } => {
            set_participant(&config, &id, &profile.skills, profile.vector).await?;
        }
        Commands::Hackathon { id, profile } => {
            set_hackathon(
                &config,
                &id,
                &profile.skills,
                profile.document.as_deref(),
                profile.vector,
            )
            .await?;
        }
        Commands::Seed {
            collection,
            file,
            append,
        } => {
            seed(&config, collection, &file, append).await?;
        }
        Commands::Recommend {
            participant,
            hackathon,
            top_k,
            strategy,
            json,
        } => {
            recommend(&config, &participant, &hackathon, top_k, strategy, json).await?;
        }
        Commands::Get { collection, id } => {
            get_record(&config, collection, &id).await?;
        }
        Commands::Delete { collection, id } => {
            delete_record(&config, collection, &id).await?;
        }
        Commands::DeleteAll { collection } => {
            delete_all(&config, &collection).await?;
        }
        Commands::Index { collection } => {
            build_index(&config, collection).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Health => {
            health(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn recommend_command_parsing() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "recommend",
            "alice",
            "hack-42",
            "--top-k",
            "3",
            "--strategy",
            "team",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Recommend {
                participant,
                hackathon,
                top_k,
                strategy,
                json,
            } => {
                assert_eq!(participant, "alice");
                assert_eq!(hackathon, "hack-42");
                assert_eq!(top_k, Some(3));
                assert_eq!(strategy, Some(Strategy::Team));
                assert!(!json);
            }
            _ => panic!("expected recommend command"),
        }
    }

    #[test]
    fn negative_top_k_is_accepted() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "recommend",
            "alice",
            "hack-42",
            "--top-k",
            "-1",
        ])
        .expect("should parse");

        if let Commands::Recommend { top_k, strategy, .. } = cli.command {
            assert_eq!(top_k, Some(-1));
            assert_eq!(strategy, None);
        }
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "recommend",
            "alice",
            "hack-42",
            "--strategy",
            "hybrid",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn participant_skills_split_on_commas() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "participant",
            "alice",
            "--skills",
            "Rust,React",
            "--skills",
            "SQL",
        ])
        .expect("should parse");

        if let Commands::Participant { id, profile } = cli.command {
            assert_eq!(id, "alice");
            assert_eq!(profile.skills, vec!["Rust", "React", "SQL"]);
            assert!(profile.vector.is_none());
        }
    }

    #[test]
    fn participant_vector_parses_floats() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "participant",
            "bob",
            "--vector",
            "0.6,-0.8",
        ])
        .expect("should parse");

        if let Commands::Participant { profile, .. } = cli.command {
            assert_eq!(profile.vector, Some(vec![0.6, -0.8]));
        }
    }

    #[test]
    fn participant_requires_a_profile() {
        let cli = Cli::try_parse_from(["teammate-recommender", "participant", "alice"]);
        assert!(cli.is_err());
    }

    #[test]
    fn hackathon_profile_sources_are_exclusive() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "hackathon",
            "h1",
            "--skills",
            "Rust",
            "--document",
            "h1.json",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn collection_arguments_are_parsed() {
        let cli = Cli::try_parse_from(["teammate-recommender", "get", "Participants", "alice"])
            .expect("should parse");

        if let Commands::Get { collection, id } = cli.command {
            assert_eq!(collection, Collection::Participants);
            assert_eq!(id, "alice");
        }

        let cli = Cli::try_parse_from(["teammate-recommender", "index", "mentors"]);
        assert!(cli.is_err());
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from([
            "teammate-recommender",
            "status",
            "--config-dir",
            "/tmp/recommender",
        ])
        .expect("should parse");
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/recommender")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["teammate-recommender", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["teammate-recommender", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["teammate-recommender", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
