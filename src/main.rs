//! voxd - hotkey-triggered voice dictation for Linux
//!
//! Run with `voxd` or `voxd daemon` to start the daemon.
//! Use `voxd setup` to check dependencies and download models.
//! Use `voxd transcribe <file>` to transcribe an audio file.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voxd::audio::Waveform;
use voxd::error::{LockError, VoxdError};
use voxd::{config, hotkey, transcribe};

#[derive(Parser)]
#[command(name = "voxd")]
#[command(author, version, about = "Hotkey-triggered voice dictation for Linux")]
#[command(long_about = "
voxd is a voice dictation daemon for Linux. Press a hotkey, speak, and the
transcription is typed into the focused application.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Run: voxd setup --download   (fetch the whisper model)
  4. Run: voxd                    (start the daemon)

USAGE:
  Press Ctrl+Alt+V (default), speak, and stop talking. Recording ends after
  a few seconds of silence and the text is typed at the cursor position.
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Override whisper model
    #[arg(short, long, value_name = "MODEL", value_parser = ["tiny", "base", "small", "medium"])]
    model: Option<String>,

    /// Override hotkey combo (e.g., "ctrl+alt+v")
    #[arg(short = 'k', long, value_name = "COMBO")]
    hotkey: Option<String>,

    /// Prefer ydotool over xdotool for typing (Wayland sessions)
    #[arg(long)]
    ydotool: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Transcribe an audio file (WAV)
    Transcribe {
        /// Path to audio file
        file: PathBuf,
    },

    /// Check setup and optionally download models
    Setup {
        /// Download model if missing
        #[arg(long)]
        download: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxd={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(model) = cli.model {
        config.whisper.model = model;
    }
    if let Some(combo) = cli.hotkey {
        config.hotkey = hotkey::parse_combo(&combo)?;
    }
    if cli.ydotool {
        config.output.force_ydotool = true;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let daemon = voxd::Daemon::new(config);
            if let Err(e) = daemon.run().await {
                if let VoxdError::Lock(LockError::AlreadyRunning(ref path)) = e {
                    eprintln!("voxd is already running (lock held at {})", path);
                    std::process::exit(1);
                }
                return Err(e.into());
            }
        }

        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }

        Commands::Setup { download } => {
            run_setup(&config, download)?;
        }

        Commands::Config => {
            show_config(&config);
        }
    }

    Ok(())
}

/// Transcribe an audio file from disk
fn transcribe_file(config: &config::Config, path: &Path) -> anyhow::Result<()> {
    use hound::WavReader;

    println!("Loading audio file: {:?}", path);

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    println!(
        "Audio format: {} Hz, {} channel(s), {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    // Convert samples to f32
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().filter_map(|s| s.ok()).collect(),
    };

    // Mix to mono if stereo
    let mono_samples: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    } else {
        samples
    };

    // Resample to 16kHz if needed
    let final_samples = if spec.sample_rate != 16000 {
        println!("Resampling from {} Hz to 16000 Hz...", spec.sample_rate);
        voxd::audio::resample(&mono_samples, spec.sample_rate, 16000)
    } else {
        mono_samples
    };

    println!(
        "Processing {} samples ({:.2}s)...",
        final_samples.len(),
        final_samples.len() as f32 / 16000.0
    );

    let waveform = Waveform {
        sample_rate: 16000,
        channels: 1,
        samples: final_samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect(),
    };

    let transcriber = transcribe::create_transcriber(&config.whisper)?;
    let text = transcriber.transcribe(&waveform)?;

    println!("\n{}", text);
    Ok(())
}

/// Run the setup command
fn run_setup(config: &config::Config, download: bool) -> anyhow::Result<()> {
    println!("voxd Setup\n");
    println!("==========\n");

    println!("Creating directories...");
    config::Config::ensure_directories()?;
    println!(
        "  ✓ Config directory: {:?}",
        config::Config::config_dir().unwrap_or_default()
    );
    println!("  ✓ Models directory: {:?}", config::Config::models_dir());

    // Create default config file if it doesn't exist
    if let Some(config_path) = config::Config::default_path() {
        if !config_path.exists() {
            println!("\nCreating default config file...");
            std::fs::write(&config_path, config::DEFAULT_CONFIG)?;
            println!("  ✓ Created: {:?}", config_path);
        } else {
            println!("\n  Config file exists: {:?}", config_path);
        }
    }

    let mut all_ok = true;

    // Check input group
    println!("\nChecking input group membership...");
    let groups_output = std::process::Command::new("groups").output()?;
    let groups_str = String::from_utf8_lossy(&groups_output.stdout);
    if groups_str.contains("input") {
        println!("  ✓ User is in 'input' group");
    } else {
        println!("  ✗ User is NOT in 'input' group");
        println!("    Run: sudo usermod -aG input $USER");
        println!("    Then log out and back in");
        all_ok = false;
    }

    // Check output tools
    println!("\nChecking output tools...");
    let mut any_typing_tool = false;
    for tool in ["xdotool", "ydotool", "xclip"] {
        if which::which(tool).is_ok() {
            println!("  ✓ {} found", tool);
            any_typing_tool = true;
        } else {
            println!("  ✗ {} not found", tool);
        }
    }
    if !any_typing_tool {
        println!("    Install at least one of xdotool, ydotool, or xclip");
        all_ok = false;
    }

    // Check notification tool
    println!("\nChecking notify-send...");
    if which::which("notify-send").is_ok() {
        println!("  ✓ notify-send found");
    } else {
        println!("  ✗ notify-send not found (no desktop feedback, dictation still works)");
    }

    // Check whisper model
    println!("\nChecking whisper model...");
    let models_dir = config::Config::models_dir();
    let model_name = &config.whisper.model;
    let model_filename = transcribe::whisper::get_model_filename(model_name);
    let model_path = models_dir.join(&model_filename);

    if model_path.exists() {
        let size = std::fs::metadata(&model_path)
            .map(|m| m.len() as f64 / 1024.0 / 1024.0)
            .unwrap_or(0.0);
        println!("  ✓ Model found: {:?} ({:.0} MB)", model_path, size);
    } else {
        println!("  ✗ Model not found: {:?}", model_path);

        let url = transcribe::whisper::get_model_url(model_name);
        if download {
            println!("\n  Downloading model...");
            println!("  URL: {}", url);
            std::fs::create_dir_all(&models_dir)?;

            let response = ureq::get(&url).call()?;
            let mut reader = response.into_reader();
            let mut file = std::fs::File::create(&model_path)?;
            let bytes = std::io::copy(&mut reader, &mut file)?;
            println!(
                "  ✓ Downloaded {:.0} MB to {:?}",
                bytes as f64 / 1024.0 / 1024.0,
                model_path
            );
        } else {
            all_ok = false;
            println!("\n  To download automatically, run: voxd setup --download");
            println!("  Or manually download from:");
            println!("    {}", url);
            println!("  And place in: {:?}", models_dir);
        }
    }

    println!("\n---");
    if all_ok {
        println!("✓ All checks passed! Run 'voxd' to start.");
    } else {
        println!("✗ Some checks failed. Please fix the issues above.");
    }

    Ok(())
}

/// Show current configuration
fn show_config(config: &config::Config) {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[hotkey]");
    println!("  key = {:?}", config.hotkey.key);
    println!("  modifiers = {:?}", config.hotkey.modifiers);

    println!("\n[audio]");
    println!("  device = {:?}", config.audio.device);
    println!("  sample_rate = {}", config.audio.sample_rate);
    println!("  chunk_size = {}", config.audio.chunk_size);
    println!("  silence_threshold = {}", config.audio.silence_threshold);
    println!(
        "  silence_duration_secs = {}",
        config.audio.silence_duration_secs
    );
    println!("  min_recording_secs = {}", config.audio.min_recording_secs);
    println!("  max_duration_secs = {}", config.audio.max_duration_secs);

    println!("\n[whisper]");
    println!("  model = {:?}", config.whisper.model);
    println!("  language = {:?}", config.whisper.language);
    println!("  translate = {}", config.whisper.translate);
    if let Some(threads) = config.whisper.threads {
        println!("  threads = {}", threads);
    }
    println!("  vad.enabled = {}", config.whisper.vad.enabled);

    println!("\n[output]");
    println!("  force_ydotool = {}", config.output.force_ydotool);
    println!("  type_delay_ms = {}", config.output.type_delay_ms);
    println!("  min_chars = {}", config.output.min_chars);

    println!("\n---");
    println!(
        "Config file: {:?}",
        config::Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!("Models dir: {:?}", config::Config::models_dir());
    println!("Lock file: {:?}", config::Config::lock_file_path());
}
