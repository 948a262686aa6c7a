//! cloudsync-decrypt 命令行入口
//!
//! 用法：
//!   cloudsync-decrypt <encrypted_file> <password> <output>
//!
//! - 输入为目录时，递归解密其中所有 CloudSync 文件到输出目录
//! - 密码传 `-` 时从终端读取，避免出现在 shell 历史中
//! - 所有实际逻辑都委托给库

use std::path::PathBuf;
use std::process::exit;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use cloudsync_decrypt::DecryptOptions;

#[derive(Parser, Debug)]
#[command(
    name = "cloudsync-decrypt",
    about = "Decrypt Synology CloudSync encrypted files.",
    after_help = "Example:\n  cloudsync-decrypt encrypted.txt mypassword decrypted.txt"
)]
struct Cli {
    /// Encrypted file, or a directory of encrypted files
    #[arg(value_name = "ENCRYPTED_FILE")]
    input: PathBuf,

    /// Password; use "-" to be prompted
    #[arg(value_name = "PASSWORD")]
    password: String,

    /// Output file (or directory when the input is a directory)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Overwrite existing output files
    #[arg(short, long)]
    force: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let password = if cli.password == "-" {
        rpassword::prompt_password("Password: ").context("failed to read password")?
    } else {
        cli.password
    };

    let options = DecryptOptions {
        overwrite: cli.force,
    };

    if cli.input.is_dir() {
        let report = cloudsync_decrypt::decrypt_folder(&cli.input, &cli.output, &password, &options)
            .with_context(|| format!("failed to decrypt folder {}", cli.input.display()))?;
        println!(
            "Decryption successful! {} file(s) decrypted, {} skipped. Output: {}",
            report.decrypted,
            report.skipped,
            cli.output.display()
        );
    } else {
        cloudsync_decrypt::decrypt_with_options(&cli.input, &cli.output, &password, &options)
            .with_context(|| format!("failed to decrypt {}", cli.input.display()))?;
        println!("Decryption successful! Output: {}", cli.output.display());
    }

    Ok(())
}
