use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{kube, ssh};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "carrier")]
#[command(version = VERSION)]
#[command(about = "Run a script on many hosts or pods and collect what it leaves behind")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script on hosts over SSH
    Ssh(ssh::SshArgs),
    /// Run a script in pods selected by label
    Kube(kube::KubeArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
