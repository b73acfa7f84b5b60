//! ros_cross_compile - cross-compile ROS and ROS 2 workspaces in containers
//!
//! Runs the three-stage pipeline against the local Docker engine:
//!
//! - gather rosdeps for the workspace (skippable with `--skip-rosdep`)
//! - build the workspace sysroot image
//! - run the emulated build inside it
//!
//! Exits 0 when every stage succeeds and 1 on the first failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rcc_core::{DockerEngine, LogSink, PlatformDescriptor, RosDistro, TracingSink};
use rcc_pipeline::{Pipeline, PipelineOptions, PipelineReport, WorkspaceLayout};
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "ros_cross_compile")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sysroot creator for cross compilation workflows.", long_about = None)]
struct Cli {
    /// Target architecture (armhf, aarch64)
    #[arg(short, long, env = "RCC_ARCH")]
    arch: String,

    /// Target OS, e.g. ubuntu or debian
    #[arg(short, long, env = "RCC_OS")]
    os: String,

    /// Target OS distribution, e.g. bionic; defaults to the release the ROS
    /// distribution targets
    #[arg(long, env = "RCC_OS_DISTRO")]
    os_distro: Option<String>,

    /// Target ROS distribution (kinetic, melodic, noetic, dashing, eloquent, foxy)
    #[arg(short = 'd', long, default_value = "dashing")]
    rosdistro: String,

    /// Override the default base Docker image used for the sysroot,
    /// e.g. "arm64v8/ubuntu:bionic"
    #[arg(long)]
    sysroot_base_image: Option<String>,

    /// Disable Docker's build cache for every image built in this run
    #[arg(long)]
    sysroot_nocache: bool,

    /// Subdirectory of the sysroot path containing the `src` to build;
    /// cross-compiled output is written back into it
    #[arg(long, default_value = "ros_ws")]
    ros_workspace: String,

    /// Absolute path to the directory holding the ROS workspace and
    /// `qemu-user-static` (default: current directory)
    #[arg(long)]
    sysroot_path: Option<PathBuf>,

    /// Shell script executed in the sysroot container right before
    /// `rosdep install`, e.g. to add extra apt sources
    #[arg(long)]
    custom_setup_script: Option<PathBuf>,

    /// Directory copied into the sysroot container, available to the custom
    /// setup script as `./custom_data/`
    #[arg(long)]
    custom_data_dir: Option<PathBuf>,

    /// Skip gathering rosdeps. The build fails if they were never gathered or
    /// the workspace gained dependencies since
    #[arg(long)]
    skip_rosdep: bool,

    /// Directory holding `rosdep.Dockerfile` and `Dockerfile_workspace`
    /// (default: ~/.ros_cross_compile/docker)
    #[arg(long, env = "RCC_DOCKER_DIR")]
    docker_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report warnings and errors, plus build and container output
    #[arg(short, long)]
    quiet: bool,

    /// Emit JSON-formatted log lines and a JSON run report
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    rcc_core::init_tracing(cli.json, log_level(&cli));

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn log_level(cli: &Cli) -> Level {
    if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let platform = resolve_platform(cli)?;
    let layout = resolve_layout(cli)?;
    layout.validate()?;
    info!(platform = %platform, root = %layout.root().display(), "Resolved cross-compile target");

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
    let engine = DockerEngine::connect(cli.sysroot_nocache, sink)
        .context("Failed to create Docker client")?;
    engine
        .ping()
        .await
        .context("Docker daemon is not reachable")?;

    let pipeline = Pipeline::standard(PipelineOptions::for_current_user(cli.skip_rosdep));
    let report = pipeline.run(&platform, &layout, &engine).await?;

    print_report(&report, cli.json)
}

/// Validate the target triple before anything talks to Docker.
fn resolve_platform(cli: &Cli) -> Result<PlatformDescriptor> {
    let os_distro = match &cli.os_distro {
        Some(distro) => distro.clone(),
        // An unknown ROS distro leaves this empty; the descriptor reports it.
        None => cli
            .rosdistro
            .parse::<RosDistro>()
            .map(|d| d.default_os_distro().to_string())
            .unwrap_or_default(),
    };

    PlatformDescriptor::new(
        &cli.arch,
        &cli.os,
        &os_distro,
        &cli.rosdistro,
        cli.sysroot_base_image.clone(),
    )
    .context("Invalid target platform")
}

fn resolve_layout(cli: &Cli) -> Result<WorkspaceLayout> {
    let root = match &cli.sysroot_path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Sysroot path {:?} does not exist", root))?;

    let docker_dir = match &cli.docker_dir {
        Some(dir) => dir.clone(),
        None => dirs::home_dir()
            .context("Could not determine home directory for the default docker directory")?
            .join(".ros_cross_compile")
            .join("docker"),
    };

    Ok(WorkspaceLayout::new(root, &cli.ros_workspace, docker_dir)
        .with_custom_setup_script(cli.custom_setup_script.clone())
        .with_custom_data_dir(cli.custom_data_dir.clone()))
}

fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Cross-compile run {} for {}", report.run_id, report.platform);
    for stage in &report.stages {
        match &stage.image {
            Some(image) if !stage.skipped => {
                println!("  ✓ {:<16} {} ({} ms)", stage.stage_name, image, stage.duration_ms)
            }
            _ => println!("  - {:<16} skipped", stage.stage_name),
        }
    }
    println!("Finished in {} ms", report.duration_ms);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ros_cross_compile"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-a", "aarch64", "-o", "ubuntu"]);
        assert_eq!(cli.rosdistro, "dashing");
        assert_eq!(cli.ros_workspace, "ros_ws");
        assert!(!cli.skip_rosdep);
        assert!(!cli.sysroot_nocache);
        assert!(cli.sysroot_path.is_none());
    }

    #[test]
    fn test_log_level_flags() {
        assert_eq!(log_level(&parse(&["-a", "armhf", "-o", "ubuntu"])), Level::INFO);
        assert_eq!(log_level(&parse(&["-a", "armhf", "-o", "ubuntu", "-v"])), Level::DEBUG);
        assert_eq!(log_level(&parse(&["-a", "armhf", "-o", "ubuntu", "-q"])), Level::WARN);
        assert!(Cli::try_parse_from(["ros_cross_compile", "-a", "armhf", "-o", "ubuntu", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_arch_and_os_required() {
        assert!(Cli::try_parse_from(["ros_cross_compile", "-o", "ubuntu"]).is_err());
        assert!(Cli::try_parse_from(["ros_cross_compile", "-a", "armhf"]).is_err());
    }

    #[test]
    fn test_os_distro_defaults_from_rosdistro() {
        let cli = parse(&["-a", "aarch64", "-o", "ubuntu", "-d", "foxy"]);
        let platform = resolve_platform(&cli).unwrap();
        assert_eq!(platform.os_distro(), "focal");
        assert_eq!(
            platform.sysroot_image_tag(),
            "rcc/ros_cross_compile:aarch64-ubuntu-focal"
        );
    }

    #[test]
    fn test_explicit_os_distro() {
        let cli = parse(&["-a", "aarch64", "-o", "ubuntu", "--os-distro", "bionic", "-d", "foxy"]);
        let platform = resolve_platform(&cli).unwrap();
        assert_eq!(
            platform.sysroot_image_tag(),
            "rcc/ros_cross_compile:aarch64-ubuntu-bionic"
        );
    }

    #[test]
    fn test_unsupported_arch_rejected() {
        let cli = parse(&["-a", "x86_64", "-o", "ubuntu"]);
        let err = resolve_platform(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported architecture: x86_64"));
    }

    #[test]
    fn test_unsupported_rosdistro_rejected() {
        let cli = parse(&["-a", "armhf", "-o", "ubuntu", "-d", "lunar"]);
        let err = resolve_platform(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported target distribution: lunar"));
    }

    #[test]
    fn test_resolve_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_str().unwrap().to_string();
        let cli = parse(&[
            "-a",
            "armhf",
            "-o",
            "ubuntu",
            "--sysroot-path",
            &root,
            "--ros-workspace",
            "my_ws",
            "--docker-dir",
            "/opt/rcc/docker",
            "--skip-rosdep",
        ]);

        let layout = resolve_layout(&cli).unwrap();
        assert_eq!(
            layout.ros_workspace(),
            tmp.path().canonicalize().unwrap().join("my_ws")
        );
        assert_eq!(layout.docker_dir(), std::path::Path::new("/opt/rcc/docker"));
        assert!(cli.skip_rosdep);
    }

    #[test]
    fn test_missing_sysroot_path() {
        let cli = parse(&["-a", "armhf", "-o", "ubuntu", "--sysroot-path", "/nonexistent/rcc"]);
        assert!(resolve_layout(&cli).is_err());
    }
}
