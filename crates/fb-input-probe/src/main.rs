use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fb_input::{BridgeConfig, ButtonMask, DeviceOptions, PointerBridge, PointerMode, Rotation};

/// Inject a single tap (absolute mode) or pointer move (relative mode)
/// through fb-input, for checking a panel's touch/rotation setup.
#[derive(Parser, Debug)]
#[command(name = "fb-input-probe", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Touch device node, e.g. /dev/input/event0.
    #[arg(long)]
    device: Option<PathBuf>,

    /// Panel rotation in degrees (0, 90, 180, 270).
    #[arg(long, allow_hyphen_values = true)]
    rotate: Option<i32>,

    /// Use a virtual relative pointer instead of the touch device.
    #[arg(long)]
    relative: bool,

    /// Framebuffer width in pixels.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Framebuffer height in pixels.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Button mask held during the tap, as sent over the wire
    /// (bit 0 left, bit 1 middle, bit 2 right).
    #[arg(long, default_value_t = 1)]
    buttons: i32,

    /// Delay between press and release, in milliseconds.
    #[arg(long, default_value_t = 80)]
    hold_ms: u64,

    /// Target X coordinate in framebuffer pixels.
    x: i32,

    /// Target Y coordinate in framebuffer pixels.
    y: i32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_and_merge_config(&cli)?;

    let mut bridge = PointerBridge::new(DeviceOptions::from(&cfg));
    bridge
        .init_from_config(&cfg)
        .with_context(|| format!("failed to initialize {:?} pointer", cfg.mode))?;

    let result = run_probe(&mut bridge, &cfg, &cli);
    bridge.cleanup_mouse();
    result
}

/// Load config from file and apply CLI overrides.
fn load_and_merge_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut cfg = fb_input::config::load(cli.config.as_deref())?;

    if let Some(device) = &cli.device {
        cfg.touch_device = device.clone();
    }
    if let Some(degrees) = cli.rotate {
        cfg.rotate = Rotation::from_degrees(degrees)?;
    }
    if cli.relative {
        cfg.mode = PointerMode::Relative;
    }
    if let (Some(width), Some(height)) = (cli.width, cli.height) {
        cfg.geometry = Some(fb_input::ScreenGeometry::new(width, height)?);
    }

    if cfg.mode == PointerMode::Relative && cfg.geometry.is_none() {
        bail!("relative mode requires --width/--height (or geometry in config)");
    }

    Ok(cfg)
}

/// Tap at (x, y), or in relative mode move from the origin to (x, y) and
/// click there.
fn run_probe(bridge: &mut PointerBridge, cfg: &BridgeConfig, cli: &Cli) -> Result<()> {
    let hold = Duration::from_millis(cli.hold_ms);
    // Without a configured geometry, coordinates are in the touch
    // device's own axis space.
    let Some(screen) = cfg.geometry.or_else(|| bridge.geometry()) else {
        bail!("no screen geometry available");
    };
    let down = ButtonMask::from_raw(cli.buttons);
    let up = ButtonMask::default();

    if cfg.mode == PointerMode::Relative {
        bridge.inject_mouse_event(screen, up, 0, 0)?;
    }
    bridge.inject_mouse_event(screen, down, cli.x, cli.y)?;
    thread::sleep(hold);
    bridge.inject_mouse_event(screen, up, cli.x, cli.y)?;

    tracing::info!(
        x = cli.x,
        y = cli.y,
        mode = ?cfg.mode,
        rotation = cfg.rotate.degrees(),
        failed_frames = bridge.failed_frames(),
        "Probe finished"
    );
    Ok(())
}
