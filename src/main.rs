// src/main.rs
//! Updraft - CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use updraft::commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "updraft")]
#[command(author = "Updraft Project")]
#[command(version)]
#[command(about = "Secure application self-update engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a P-256 signing key pair (privateKey.pem, publicKey.pem)
    GenerateKeys {
        /// Directory to write the key files into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Build a signed update package from two installation trees
    CreateUpdatePackage {
        /// Previous version's installation tree
        old_dir: PathBuf,

        /// New version's installation tree
        new_dir: PathBuf,

        /// Where update.pkg and meta.json are written
        output_dir: PathBuf,

        /// PEM private signing key
        private_key: PathBuf,

        /// Optional release config JSON
        config: Option<PathBuf>,
    },

    /// Rewrite a release-feed entry with a package hash and signature
    Sign {
        /// Feed entry JSON to rewrite in place
        info: PathBuf,

        /// PEM private signing key
        private_key: PathBuf,

        /// Package file the entry points at
        package: PathBuf,
    },

    /// Print the lowercase hex SHA-256 of a file
    Hash {
        file: PathBuf,
    },

    /// Create a bsdiff patch from two files
    CreatePatch {
        old: PathBuf,
        new: PathBuf,
        patch: PathBuf,
    },

    /// Apply a bsdiff patch to a file
    ApplyPatch {
        old: PathBuf,
        patch: PathBuf,
        new: PathBuf,
    },

    /// Apply an update package to an installation directory
    Apply {
        /// The downloaded update package
        package: PathBuf,

        /// Installation directory to transform
        target_dir: PathBuf,

        /// PEM public key the package must verify against
        #[arg(long)]
        public_key: PathBuf,

        /// Base URL for the full-package fallback on source drift
        #[arg(long)]
        fallback_url: Option<String>,
    },

    /// Verify a package's signature and entry hashes without applying it
    Verify {
        /// The downloaded update package
        package: PathBuf,

        /// PEM public key the package must verify against
        #[arg(long)]
        public_key: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::GenerateKeys { out }) => commands::cmd_generate_keys(&out),

        Some(Commands::CreateUpdatePackage {
            old_dir,
            new_dir,
            output_dir,
            private_key,
            config,
        }) => commands::cmd_create_update_package(
            &old_dir,
            &new_dir,
            &output_dir,
            &private_key,
            config.as_deref(),
        ),

        Some(Commands::Sign {
            info,
            private_key,
            package,
        }) => commands::cmd_sign(&info, &private_key, &package),

        Some(Commands::Hash { file }) => commands::cmd_hash(&file),

        Some(Commands::CreatePatch { old, new, patch }) => {
            commands::cmd_create_patch(&old, &new, &patch)
        }

        Some(Commands::ApplyPatch { old, patch, new }) => {
            commands::cmd_apply_patch(&old, &patch, &new)
        }

        Some(Commands::Apply {
            package,
            target_dir,
            public_key,
            fallback_url,
        }) => commands::cmd_apply(&package, &target_dir, &public_key, fallback_url.as_deref()),

        Some(Commands::Verify {
            package,
            public_key,
        }) => commands::cmd_verify(&package, &public_key),

        None => {
            println!("Updraft v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'updraft --help' for usage information");
            Ok(())
        }
    }
}
