//! Build automation for etcd-kube
//!
//! Usage: cargo xtask <command>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BIN: &str = "etcd-kube";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for etcd-kube")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the operator binary
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Also run tests that need a live Kubernetes cluster (KUBECONFIG)
        #[arg(long)]
        live: bool,
    },
    /// Package the release binary as etcd-kube-<version>.tar.gz
    Dist {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },
    /// Run CI checks (format, clippy, test)
    Ci,
    /// Format code
    Format {
        #[arg(long)]
        check: bool,
    },
    /// Run clippy
    Clippy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { live } => test(&sh, live),
        Commands::Dist { target } => dist(&sh, target),
        Commands::Ci => ci(&sh),
        Commands::Format { check } => format(&sh, check),
        Commands::Clippy => clippy(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    let profile = if release { "release" } else { "debug" };
    println!("🔨 Building {} ({})...", BIN, profile);

    if release {
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
    } else {
        cmd!(sh, "cargo build --bin {BIN}").run()?;
    }

    println!("✅ Build completed: target/{}/{}", profile, BIN);
    Ok(())
}

fn test(sh: &Shell, live: bool) -> Result<()> {
    println!("🧪 Running tests...");
    cmd!(sh, "cargo test --workspace").run()?;

    if live {
        println!("\n☸️  Running live-cluster tests...");
        cmd!(sh, "cargo test --test '*' -- --ignored --test-threads=1")
            .run()
            .context("live-cluster tests failed (is KUBECONFIG pointing at a test cluster?)")?;
    }

    println!("✅ All tests passed");
    Ok(())
}

fn dist(sh: &Shell, target: Option<String>) -> Result<()> {
    println!("📦 Creating distribution package...");

    let release_dir = match target {
        Some(ref triple) => {
            cmd!(sh, "cargo build --release --bin {BIN} --target {triple}").run()?;
            format!("target/{}/release", triple)
        }
        None => {
            cmd!(sh, "cargo build --release --bin {BIN}").run()?;
            "target/release".to_string()
        }
    };

    let root = project_root()?;
    let dist_dir = root.join("dist");
    sh.create_dir(&dist_dir)?;
    sh.copy_file(root.join(&release_dir).join(BIN), dist_dir.join(BIN))?;

    let archive = format!("{}-{}.tar.gz", BIN, env!("CARGO_PKG_VERSION"));
    cmd!(sh, "tar -czf {archive} -C dist {BIN}")
        .run()
        .context("Failed to create tarball")?;

    println!("✅ Distribution package created: {}", archive);
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔍 Running CI checks...");

    format(sh, true)?;
    clippy(sh)?;
    test(sh, false)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
    }
    println!("✅ Formatting ok");
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("✅ Clippy checks passed");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask must live one level below the workspace root")
}
