mod cli;

use ffpilot::config;
use ffpilot_av::{
    format_duration, MediaDescriptor, PipeReader, PipeWriter, Progress, SessionState,
    TranscodeHandle,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Time ffmpeg gets to honour a quit request before it is killed on timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Options of the `transcode` command.
struct TranscodeOptions {
    input: String,
    output: String,
    format: Option<String>,
    input_args: Vec<String>,
    ffmpeg_args: Vec<String>,
    progress: bool,
    timeout: Option<Duration>,
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ffpilot=trace,ffpilot_av=trace".to_string()
        } else {
            "ffpilot=info,ffpilot_av=info".to_string()
        }
    });

    // Logs go to stderr: stdout may carry media.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { input, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_input(&input, json, cli.config.as_deref()))
        }
        Commands::Transcode {
            input,
            output,
            format,
            input_args,
            quiet,
            timeout,
            dry_run,
            ffmpeg_args,
        } => {
            let opts = TranscodeOptions {
                input,
                output,
                format,
                input_args,
                ffmpeg_args,
                progress: !quiet,
                timeout: timeout.map(Duration::from_secs),
                dry_run,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode(opts, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ffpilot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn probe_input(input: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let prober = ffpilot_av::FfprobeProber::from_toolchain(&config.toolchain())?
        .with_timeout(Duration::from_secs(config.transcode.probe_timeout_secs));

    let descriptor = prober
        .probe(input, &config.transcode.protocol_whitelist)
        .await
        .with_context(|| format!("Failed to probe {input}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    } else {
        print_descriptor(input, &descriptor);
    }
    Ok(())
}

fn print_descriptor(input: &str, descriptor: &MediaDescriptor) {
    let format = &descriptor.format;
    println!("Input: {}", input);
    println!("Format: {} ({})", format.extensions.join(","), format.format_long_name);
    println!("Duration: {}", format_duration(format.seconds()));
    println!("Size: {} bytes", format.size);
    println!("Bit rate: {} b/s", format.bit_rate);
    if let Some(ref encoder) = format.tags.encoder {
        println!("Encoder: {}", encoder);
    }

    println!("\nStreams: {}", descriptor.streams.len());
    for stream in &descriptor.streams {
        print!("  [{}] {} {}", stream.index, stream.codec_kind, stream.codec_name);
        if stream.is_video() {
            print!(" {}x{} {:.3} fps", stream.width, stream.height, stream.frame_rate);
            if let Some(orientation) = stream.orientation() {
                print!(" {:?}", orientation);
            }
            if stream.is_rotated() == Some(true) {
                print!(" [rotated]");
            }
        }
        if let Some(lang) = stream.tags.as_ref().and_then(|t| t.language.as_ref()) {
            print!(" ({})", lang);
        }
        if stream.disposition.default {
            print!(" [default]");
        }
        println!();
    }
}

async fn transcode(opts: TranscodeOptions, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let transcoder = config.transcoder();

    let read_stdin = opts.input == "-";
    let write_stdout = opts.output == "-";

    let mut session = if read_stdin || write_stdout {
        let mut session = transcoder.initialize_empty()?;
        if !read_stdin {
            session.set_input_path(opts.input.as_str())?;
            if opts.progress {
                if let Err(e) = session.probe_input().await {
                    tracing::warn!("Probe failed, progress will lack percentages: {}", e);
                }
            }
        }
        if !write_stdout {
            session.set_output_path(opts.output.as_str())?;
        }
        session
    } else {
        transcoder
            .initialize(&opts.input, &opts.output)
            .await
            .with_context(|| format!("Failed to set up transcode of {}", opts.input))?
    };

    let input_pipe = if read_stdin {
        Some(session.create_input_pipe()?)
    } else {
        None
    };
    let output_pipe = if write_stdout {
        let format = opts
            .format
            .clone()
            .context("--format is required when writing to stdout")?;
        Some(session.create_output_pipe(format)?)
    } else {
        if let Some(format) = opts.format.clone() {
            session.set_output_format(format);
        }
        None
    };
    session.add_input_flags(opts.input_args);
    session.add_output_flags(opts.ffmpeg_args);

    if opts.dry_run {
        println!("{}", session.command(opts.progress)?);
        return Ok(());
    }

    let mut running = session.start(opts.progress)?;
    let handle = running.handle();

    let feeder = input_pipe.map(|writer| tokio::spawn(feed_from_stdin(writer)));
    let drainer = output_pipe.map(|reader| tokio::spawn(drain_to_stdout(reader)));

    let mut progress = running.progress();
    let show_progress = opts.progress;
    let printer = tokio::spawn(async move {
        let mut printed = false;
        while let Some(p) = progress.next().await {
            if show_progress && !p.frames_processed.is_empty() {
                eprint!("\r{}", progress_line(&p));
                printed = true;
            }
        }
        if printed {
            eprintln!();
        }
    });

    let watchdog = tokio::spawn(watch_for_stop(handle.clone(), opts.timeout));

    let result = running.wait().await;
    watchdog.abort();
    let _ = printer.await;
    if let Some(feeder) = feeder {
        // Reading our stdin may still be blocked; ffmpeg no longer needs it.
        feeder.abort();
    }
    if let Some(drainer) = drainer {
        drainer.await?.context("Failed to write output to stdout")?;
    }

    result.context("Transcode failed")?;
    tracing::info!("Transcode finished: {}", handle.state());
    Ok(())
}

fn progress_line(p: &Progress) -> String {
    let percent = p
        .percent
        .map(|v| format!("{:5.1}%", v))
        .unwrap_or_else(|| "  --- ".to_string());
    format!(
        "{} frame={} time={} bitrate={} speed={}",
        percent, p.frames_processed, p.current_time, p.current_bitrate, p.speed
    )
}

async fn feed_from_stdin(mut writer: PipeWriter) -> std::io::Result<u64> {
    let mut stdin = tokio::io::stdin();
    let copied = tokio::io::copy(&mut stdin, &mut writer).await?;
    writer.shutdown().await?;
    Ok(copied)
}

async fn drain_to_stdout(mut reader: PipeReader) -> std::io::Result<u64> {
    let mut stdout = tokio::io::stdout();
    let copied = tokio::io::copy(&mut reader, &mut stdout).await?;
    stdout.flush().await?;
    Ok(copied)
}

/// Stop on Ctrl-C or when `timeout` elapses; on timeout, kill ffmpeg if it
/// ignores the quit request.
async fn watch_for_stop(handle: TranscodeHandle, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = handle.terminated() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, asking ffmpeg to stop");
            if let Err(e) = handle.stop().await {
                tracing::warn!("Failed to stop ffmpeg: {}", e);
            }
        }
        _ = deadline => {
            tracing::warn!("Timeout reached, asking ffmpeg to stop");
            if let Err(e) = handle.stop().await {
                tracing::warn!("Failed to stop ffmpeg: {}", e);
            }
            if tokio::time::timeout(KILL_GRACE, handle.terminated()).await.is_err() {
                kill_process(&handle);
            }
        }
    }
}

#[cfg(unix)]
fn kill_process(handle: &TranscodeHandle) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if handle.state() != SessionState::Running {
        return;
    }
    let Some(pid) = handle.id() else {
        return;
    };
    tracing::warn!("ffmpeg did not exit, killing pid {}", pid);
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::warn!("Failed to kill pid {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process(handle: &TranscodeHandle) {
    if handle.state() == SessionState::Running {
        tracing::warn!("Forceful termination is not supported on this platform");
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = config.toolchain().check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to probe and transcode.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_config(&config);
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let show = |p: &Option<std::path::PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(search PATH)".to_string())
    };
    println!("  ffmpeg: {}", show(&config.tools.ffmpeg_path));
    println!("  ffprobe: {}", show(&config.tools.ffprobe_path));
    if config.transcode.protocol_whitelist.is_empty() {
        println!("  Protocol whitelist: (ffmpeg default)");
    } else {
        println!(
            "  Protocol whitelist: {}",
            config.transcode.protocol_whitelist.join(",")
        );
    }
    println!("  Progress buffer: {}", config.transcode.progress_buffer);
    println!("  Probe timeout: {}s", config.transcode.probe_timeout_secs);
}
