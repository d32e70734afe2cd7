use clap::Parser;
use slack_export_convert::{Converter, SlackUserResolver};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "slack-export-convert")]
#[command(about = "Convert a third-party Slack export tree into the official export layout")]
struct Args {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "DIR",
        help = "Directory with the third-party export (user_list.json, channel_list.json, channel_<ID>.json, channel-replies_<ID>.json)"
    )]
    input: PathBuf,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        help = "Directory to write the official export tree into (created if missing)"
    )]
    output: PathBuf,

    #[arg(
        long,
        value_name = "TOKEN",
        help = "Slack token used to resolve user IDs to profile names and to sign private file URLs"
    )]
    token: Option<String>,
}

impl Args {
    fn validate(&self) -> Result<(), Error> {
        if !self.input.is_dir() {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!("The input path '{:?}' is not a directory.", self.input),
            ))
        } else if self.output.is_file() {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!("The output directory '{:?}' is a file.", self.output),
            ))
        } else {
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("Stopping, as input parameters are invalid: {e}");
        process::exit(1);
    }

    let converter = Converter::new(&args.input, &args.output, args.token.clone());
    let result = match args.token {
        Some(token) => match SlackUserResolver::with_token(token) {
            Ok(mut resolver) => converter.convert(Some(&mut resolver)).await,
            Err(e) => {
                eprintln!("\n❌ Error: failed to build Slack API client: {e}");
                process::exit(1);
            }
        },
        None => converter.convert(None::<&mut SlackUserResolver>).await,
    };

    match result {
        Ok(report) => {
            println!("\n{}", report.format_console());
            println!("=== Conversion Complete ===");
            println!("  ✓ Output directory: {}", args.output.display());
        }
        Err(e) => {
            eprintln!("\n❌ Error: {e}");
            process::exit(1);
        }
    }
}
