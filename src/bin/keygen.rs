//! ML-DSA-65 key utility for tollgate contracts.
//!
//! Usage:
//!   tollgate-keygen generate <name> [--output-dir <dir>]
//!   tollgate-keygen proof --key <name.secret> --contract <id> --nonce <n>
//!   tollgate-keygen proof --key <name.secret> --contract <id> --timestamp <t>

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use saorsa_pqc::api::sig::{MlDsaSecretKey, MlDsaVariant};
use std::fs;
use std::path::{Path, PathBuf};
use tollgate::proof::{canonical_message, QUERY_DELEGATED, QUERY_DIRECT};
use tollgate::signature::{generate_keypair, sign};
use tollgate::Proof;

#[derive(Parser)]
#[command(name = "tollgate-keygen")]
#[command(about = "ML-DSA-65 keys and proofs for tollgate contracts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair as `<name>.secret` and `<name>.pub` (hex)
    Generate {
        /// Base name of the key files
        name: String,
        /// Directory to write the key files to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Sign a proof and print it as a query parameter
    Proof {
        /// Path to the hex secret key file
        #[arg(short, long)]
        key: PathBuf,
        /// Contract to prove against
        #[arg(short, long)]
        contract: u64,
        /// Spend nonce (delegated proof)
        #[arg(long, conflicts_with = "timestamp", required_unless_present = "timestamp")]
        nonce: Option<i64>,
        /// Wall-clock counter (direct proof)
        #[arg(long)]
        timestamp: Option<i64>,
    },
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    match Cli::parse().command {
        Commands::Generate { name, output_dir } => generate(&name, &output_dir),
        Commands::Proof {
            key,
            contract,
            nonce,
            timestamp,
        } => proof(&key, contract, nonce, timestamp),
    }
}

fn generate(name: &str, output_dir: &Path) -> color_eyre::Result<()> {
    fs::create_dir_all(output_dir)
        .wrap_err_with(|| format!("failed to create {}", output_dir.display()))?;

    let (public_key, secret_key) = generate_keypair()?;

    let sk_path = output_dir.join(format!("{name}.secret"));
    fs::write(&sk_path, hex::encode(secret_key.to_bytes()))
        .wrap_err("failed to write secret key")?;
    println!("Secret key saved to: {}", sk_path.display());
    println!("  WARNING: Keep this file secure! It signs proofs against your contracts.");

    let pk_path = output_dir.join(format!("{name}.pub"));
    fs::write(&pk_path, public_key.to_hex()).wrap_err("failed to write public key")?;
    println!("Public key saved to: {}", pk_path.display());

    println!("\nAddress: {}", public_key.address());
    Ok(())
}

fn proof(
    key_path: &Path,
    contract_id: u64,
    nonce: Option<i64>,
    timestamp: Option<i64>,
) -> color_eyre::Result<()> {
    let encoded = fs::read_to_string(key_path)
        .wrap_err_with(|| format!("failed to read {}", key_path.display()))?;
    let bytes = hex::decode(encoded.trim()).wrap_err("secret key is not hex")?;
    let secret_key = MlDsaSecretKey::from_bytes(MlDsaVariant::MlDsa65, &bytes)
        .map_err(|e| eyre!("failed to parse secret key: {e}"))?;

    let (param, proof) = match (nonce, timestamp) {
        (Some(nonce), _) => {
            let signature = sign(&secret_key, canonical_message(contract_id, nonce).as_bytes())?;
            (
                QUERY_DELEGATED,
                Proof::Delegated {
                    contract_id,
                    nonce,
                    signature,
                },
            )
        }
        (None, Some(timestamp)) => {
            let signature = sign(&secret_key, canonical_message(contract_id, timestamp).as_bytes())?;
            (
                QUERY_DIRECT,
                Proof::Direct {
                    contract_id,
                    timestamp,
                    signature,
                },
            )
        }
        (None, None) => return Err(eyre!("either --nonce or --timestamp is required")),
    };

    println!("{param}={proof}");
    Ok(())
}
