use clap::{Parser, Subcommand};
use gyatt::Repository;
use gyatt::error::exit_code;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gyatt",
    version,
    author = "Sami Barbut-Dica",
    about = "A content-addressed version control engine with a GitHub push pipeline",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize a new repository in the current directory")]
    Init,
    #[command(about = "Stage files (or directories) for the next commit")]
    Add {
        #[arg(required = true, help = "Paths to stage, relative to the repository root")]
        paths: Vec<PathBuf>,
    },
    #[command(about = "Record the staged changes as a new commit")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
    },
    #[command(about = "Show the working tree status")]
    Status,
    #[command(about = "Create a branch pointing at HEAD")]
    Branch {
        #[arg(help = "The name of the branch to create")]
        name: String,
    },
    #[command(about = "Switch HEAD to an existing branch")]
    Checkout {
        #[arg(help = "The name of the branch to check out")]
        name: String,
    },
    #[command(about = "Push HEAD's tracked files to a GitHub-compatible remote")]
    Push {
        #[arg(help = "Remote name, as configured under [remote \"<name>\"] in .gyatt/config")]
        remote: String,
        #[arg(help = "Target branch; defaults to HEAD's current branch")]
        branch: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("GYATT_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err}");
        let code = err
            .downcast_ref::<gyatt::error::Error>()
            .map(exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init => {
            Repository::init(cwd)?;
            println!("initialized empty repository");
        }
        Commands::Add { paths } => {
            let mut repository = Repository::open(cwd)?;
            repository.add(&paths)?;
        }
        Commands::Commit { message } => {
            let mut repository = Repository::open(cwd)?;
            match repository.commit(&message)? {
                Some(hash) => println!("[{}] {}", hash.to_short(), message),
                None => println!("nothing to commit"),
            }
        }
        Commands::Status => {
            let repository = Repository::open(cwd)?;
            for (path, status) in repository.status()? {
                if status != gyatt::artifacts::status::status_info::Status::Clean {
                    println!("{} {}", status.label(), path.display());
                }
            }
        }
        Commands::Branch { name } => {
            let repository = Repository::open(cwd)?;
            repository.branch(&name)?;
        }
        Commands::Checkout { name } => {
            let repository = Repository::open(cwd)?;
            repository.checkout(&name)?;
        }
        Commands::Push { remote, branch } => {
            let repository = Repository::open(cwd)?;
            let outcome = repository.push(&remote, branch.as_deref()).await?;
            println!("pushed {}", outcome.commit_sha);
        }
    }

    Ok(())
}
