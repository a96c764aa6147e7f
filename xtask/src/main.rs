use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the workspace tests
    Test,
    /// Run the CLI, passing the remaining arguments through
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run the TUI
    Tui,
    /// Create a virtual CAN interface for local runs (needs root)
    Vcan {
        #[arg(default_value = "vcan0")]
        name: String,
    },
}

fn run(program: &str, args: &[&str], what: &str) -> Result<()> {
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            run("cargo", &["build", "--workspace"], "Build")?;
        }
        Commands::Test => {
            println!("Running tests...");
            run("cargo", &["test", "--workspace"], "Test")?;
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let mut cargo_args = vec!["run", "-p", "canflash-cli", "--"];
            cargo_args.extend(args.iter().map(String::as_str));
            run("cargo", &cargo_args, "Run")?;
        }
        Commands::Tui => {
            println!("Running TUI...");
            run("cargo", &["run", "-p", "canflash-tui"], "Run")?;
        }
        Commands::Vcan { name } => {
            println!("Creating {}...", name);
            run("modprobe", &["vcan"], "modprobe")?;
            run(
                "ip",
                &["link", "add", "dev", name, "type", "vcan"],
                "ip link add",
            )?;
            run("ip", &["link", "set", "up", name], "ip link set up")?;
        }
    }

    Ok(())
}
