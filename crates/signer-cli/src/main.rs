//! `yubiplc`: sign `did:plc` operations with a YubiKey.
//!
//! # Commands
//!
//! | Command  | Description                                              |
//! |----------|----------------------------------------------------------|
//! | `init`   | Generate a new P-256 rotation key in slot 9c             |
//! | `pubkey` | Print the `did:key` of the key in slot 9c                |
//! | `sign`   | Sign the operation on stdin and print it with `sig` set  |
//! | `list`   | List connected smart card readers                        |
//!
//! ```bash
//! yubiplc init
//! yubiplc pubkey
//! yubiplc sign < operation.json > signed.json
//! ```
//!
//! The PIN and management key default to the YubiKey factory values. Set
//! `YUBIPLC_PIN` and `YUBIPLC_MANAGEMENT_KEY` (or the matching flags) once
//! they have been changed. Logs go to stderr, filtered by `RUST_LOG`
//! (default `warn`).

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;
use yubikey_plc_signer_core::flows::{self, AlreadyConfirmed, PromptConfirmation};
use yubikey_plc_signer_core::{
    Config, DeviceSelector, Error, ManagementKey, PcscLocator, Pin, PointEncoding, Result,
};

#[derive(Debug, Parser)]
#[command(name = "yubiplc", version, about = "Sign did:plc operations with a YubiKey")]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a new P-256 key in slot 9c, requiring PIN and touch for every
    /// signature, and print its did:key.
    Init {
        /// Skip the interactive confirmation.
        #[arg(long)]
        please_overwrite_my_keyslot: bool,
    },
    /// Print the did:key of the key in slot 9c.
    Pubkey,
    /// Read an operation from stdin and print it signed.
    Sign,
    /// List connected smart card readers.
    List,
}

#[derive(Debug, Args)]
struct GlobalOptions {
    /// PIV PIN [default: factory PIN]
    #[arg(long, global = true, env = "YUBIPLC_PIN", hide_env_values = true)]
    pin: Option<Pin>,

    /// PIV management key as 48 hex characters [default: factory key]
    #[arg(
        long,
        global = true,
        env = "YUBIPLC_MANAGEMENT_KEY",
        hide_env_values = true
    )]
    management_key: Option<ManagementKey>,

    /// Use the reader whose name contains this text.
    #[arg(long, global = true, env = "YUBIPLC_READER", conflicts_with = "reader_index")]
    reader: Option<String>,

    /// Use the reader at this position in `yubiplc list`.
    #[arg(long, global = true, env = "YUBIPLC_READER_INDEX")]
    reader_index: Option<usize>,

    /// How the public key is written in the did:key.
    #[arg(long, global = true, value_enum, default_value_t = Encoding::Uncompressed)]
    point_encoding: Encoding,

    /// Emit the signature exactly as the device produced it, even if its S
    /// is in the upper half of the curve order.
    #[arg(long, global = true)]
    allow_high_s: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Encoding {
    /// 65-byte `04 || X || Y`.
    Uncompressed,
    /// 33-byte form, as used by atproto.
    Compressed,
}

impl From<Encoding> for PointEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Uncompressed => Self::Uncompressed,
            Encoding::Compressed => Self::Compressed,
        }
    }
}

impl GlobalOptions {
    fn into_config(self) -> Config {
        let selector = match (self.reader, self.reader_index) {
            (Some(name), _) => DeviceSelector::Name(name),
            (None, Some(index)) => DeviceSelector::Index(index),
            (None, None) => DeviceSelector::Only,
        };

        Config {
            pin: self.pin.unwrap_or_default(),
            management_key: self.management_key.unwrap_or_default(),
            selector,
            point_encoding: self.point_encoding.into(),
            normalize_s: !self.allow_high_s,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match hint(&err) {
                Some(hint) => error!("{err}; {hint}"),
                None => error!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Points at the flags that resolve an error, when there are any.
fn hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::AmbiguousDevice(_) => {
            Some("pass --reader <name> or --reader-index <n> (see `yubiplc list`)")
        }
        _ => None,
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.options.into_config();
    let locator = PcscLocator;

    let output = match cli.command {
        Command::Init {
            please_overwrite_my_keyslot,
        } => {
            config.warn_on_defaults();
            let did = if please_overwrite_my_keyslot {
                flows::init(&locator, &config, &mut AlreadyConfirmed)?
            } else {
                let mut prompt = PromptConfirmation::new(io::stdin().lock(), io::stderr());
                flows::init(&locator, &config, &mut prompt)?
            };
            eprintln!("Success! Here's the public key:");
            format!("{did}\n")
        }
        Command::Pubkey => format!("{}\n", flows::pubkey(&locator, &config)?),
        Command::Sign => {
            config.warn_on_defaults();
            flows::sign(&locator, &config, io::stdin().lock(), &mut io::stderr())?
        }
        Command::List => flows::list(&locator)?,
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
