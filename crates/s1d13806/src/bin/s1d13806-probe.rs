//! s1d13806-probe: bring-up checks for an S1D13806 board
//!
//! ```text
//! s1d13806-probe info                 # kernel mode and derived visual
//! s1d13806-probe config               # effective configuration as JSON
//! s1d13806-probe clear --color f800   # BitBLT fill of the visible screen
//! s1d13806-probe --rotation 90 rotate # shadow bring-up and one update
//! ```

// Host tool: failures are reported through anyhow at the top level.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use platform::{
    Angle, ExaDriverInfo, PixmapHeader, PointerMatrix, Rotation, ScreenHost, SubpixelOrder,
};
use s1d13806::DriverConfig;

#[derive(Parser)]
#[command(name = "s1d13806-probe")]
#[command(about = "Epson S1D13806 framebuffer and BitBLT checks", long_about = None)]
#[command(version)]
struct Cli {
    /// Framebuffer node (overrides the configuration file)
    #[arg(long)]
    device: Option<PathBuf>,
    /// JSON driver configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base rotation in degrees: 0, 90, 180 or 270
    #[arg(long, value_parser = parse_angle)]
    rotation: Option<Angle>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print fixed and variable screen info and the derived visual
    Info,
    /// Print the effective configuration as JSON
    Config,
    /// Fill the visible screen through the BitBLT engine
    Clear {
        /// 16-bit colour, hexadecimal
        #[arg(long, default_value = "0000", value_parser = parse_color)]
        color: u16,
    },
    /// Bring the screen up at the base rotation and push one full update
    Rotate,
}

fn parse_angle(s: &str) -> Result<Angle, String> {
    match s {
        "0" => Ok(Angle::Deg0),
        "90" => Ok(Angle::Deg90),
        "180" => Ok(Angle::Deg180),
        "270" => Ok(Angle::Deg270),
        _ => Err(format!("`{s}` is not one of 0, 90, 180, 270")),
    }
}

fn parse_color(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x");
    u16::from_str_radix(digits, 16).map_err(|e| format!("`{s}`: {e}"))
}

/// Stand-in X server: accepts everything and logs what it is told.
#[derive(Debug, Default)]
struct LogHost;

impl ScreenHost for LogHost {
    fn exa_driver_init(&mut self, info: &ExaDriverInfo) -> bool {
        tracing::info!(
            memory_size = info.memory_size,
            offscreen_base = info.offscreen_base,
            max_x = info.max_x,
            max_y = info.max_y,
            "EXA registered"
        );
        true
    }

    fn mark_sync(&mut self) {
        tracing::trace!("mark sync");
    }

    fn set_pointer_matrix(&mut self, matrix: &PointerMatrix) {
        tracing::info!(matrix = ?matrix.matrix, "pointer matrix");
    }

    fn modify_screen_pixmap(&mut self, header: &PixmapHeader) -> bool {
        tracing::info!(
            width = header.width,
            height = header.height,
            depth = header.depth,
            stride = header.byte_stride,
            buffer = ?header.buffer,
            "screen pixmap"
        );
        true
    }

    fn set_subpixel_order(&mut self, order: SubpixelOrder) {
        tracing::info!(?order, "subpixel order");
    }

    fn has_visuals(&self) -> bool {
        true
    }
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    if let Some(device) = &cli.device {
        config.device.clone_from(device);
    }
    if let Some(angle) = cli.rotation {
        config.rotation = Rotation::new(angle);
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Info => run::info(&config),
        Commands::Clear { color } => run::clear(config, color),
        Commands::Rotate => run::rotate(config),
    }
}

#[cfg(target_os = "linux")]
mod run {
    use super::{DriverConfig, LogHost, Result};
    use anyhow::Context;
    use platform::linux::FbDev;
    use platform::{FramebufferDevice, Point, Rectangle};
    use s1d13806::{BltAddr, Controller, VisualFormat};

    pub fn info(config: &DriverConfig) -> Result<()> {
        let mut fb = FbDev::open(&config.device)
            .with_context(|| format!("opening {}", config.device.display()))?;
        let fix = fb.fixed_info()?;
        let var = fb.var_info()?;
        let format = VisualFormat::from_var(&var);

        println!("device       {}", config.device.display());
        println!("id           {}", fix.id_str());
        println!("smem         {:#x} + {:#x}", fix.smem_start, fix.smem_len);
        println!("line_length  {}", fix.line_length);
        println!("visual       {:?}", fix.visual());
        println!("mode         {}x{} @ {} bpp", var.xres, var.yres, var.bits_per_pixel);
        println!(
            "channels     r {}:{} g {}:{} b {}:{}",
            var.red.offset,
            var.red.length,
            var.green.offset,
            var.green.length,
            var.blue.offset,
            var.blue.length
        );
        println!(
            "masks        r {:#010x} g {:#010x} b {:#010x}",
            format.masks.red, format.masks.green, format.masks.blue
        );
        println!("depth        {}", format.depth);
        Ok(())
    }

    pub fn clear(config: DriverConfig, color: u16) -> Result<()> {
        let mut ctl = Controller::open(config, LogHost)?;
        ctl.screen_init()?;
        ctl.draw_init()?;
        let (w, h) = (ctl.card().var().xres, ctl.card().var().yres);
        ctl.blt_mut().fill(BltAddr::new(0), w, h, color)?;
        tracing::info!(w, h, color, "screen filled");
        ctl.screen_fini();
        Ok(())
    }

    pub fn rotate(config: DriverConfig) -> Result<()> {
        let mut ctl = Controller::open(config, LogHost)?;
        ctl.screen_init()?;
        ctl.init_screen();
        ctl.finish_init_screen();
        ctl.create_resources()?;
        ctl.draw_init()?;
        ctl.enable()?;

        let logical = ctl.screen().map(|s| s.logical_size()).unwrap_or_default();
        if let Some(shadow) = ctl.screen_mut().and_then(|s| s.shadow_mut()) {
            // Horizontal red ramp over a vertical blue ramp, 5-6-5.
            let size = shadow.size();
            for y in 0..size.height {
                for x in 0..size.width {
                    let r = x * 31 / size.width.max(1);
                    let b = y * 31 / size.height.max(1);
                    let px = u16::try_from((r << 11) | b).unwrap_or(0);
                    if let Some(dst) = shadow.pixel_mut(x, y) {
                        let n = dst.len().min(2);
                        dst[..n].copy_from_slice(&px.to_le_bytes()[..n]);
                    }
                }
            }
        }
        let copied = ctl.update_shadow(&[Rectangle::new(Point::zero(), logical)]);
        tracing::info!(
            width = logical.width,
            height = logical.height,
            copied,
            mode = ?ctl.mode(),
            "rotation pushed"
        );
        let _host = ctl.card_fini();
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod run {
    use super::{DriverConfig, Result};

    pub fn info(_config: &DriverConfig) -> Result<()> {
        anyhow::bail!("the framebuffer device is only available on Linux")
    }

    pub fn clear(_config: DriverConfig, _color: u16) -> Result<()> {
        anyhow::bail!("the framebuffer device is only available on Linux")
    }

    pub fn rotate(_config: DriverConfig) -> Result<()> {
        anyhow::bail!("the framebuffer device is only available on Linux")
    }
}
