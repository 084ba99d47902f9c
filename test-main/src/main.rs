mod config;

use crate::config::{BackendKind, Config};
use dotenv::dotenv;
use log::{debug, info};
use pilcd_gpio::GpioBackend;
use pilcd_gpio::gpiod::GpiodBackend;
use pilcd_gpio::lcd::hd44780::HD44780Display;
use pilcd_gpio::mock::MockGpioBackend;
use pilcd_gpio::raw::RawGpioBackend;
use std::thread::sleep;
use std::time::{Duration, Instant};
use sysinfo::System;
use time::OffsetDateTime;

const UNKNOWN_STR: &str = "???";

/// Custom glyph slot used for the bell.
const BELL_SLOT: u8 = 0;
const BELL: [u8; 8] = [
    0b00100,
    0b01110,
    0b01110,
    0b01110,
    0b11111,
    0b00000,
    0b00100,
    0b00000,
];

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Reading environment.");
        Config::from_env()?
    };

    let pins = config.lcd.pins;
    info!(
        "LCD {}x{} @ RS: {}, E: {}, Data: {:?}",
        config.lcd.width,
        config.lcd.lines,
        pins.rs,
        pins.e,
        [pins.d4, pins.d5, pins.d6, pins.d7]
    );

    match config.backend {
        BackendKind::Gpiomem => run(RawGpioBackend::new_gpiomem(), &config),
        BackendKind::Mem => run(RawGpioBackend::new_mem(), &config),
        BackendKind::Gpiod => run(GpiodBackend::new(&config.gpiochip), &config),
        BackendKind::Mock => {
            let backend = MockGpioBackend::default();
            run(backend.clone(), &config)?;
            info!("Dry run: {} pin writes recorded.", backend.write_count());
            Ok(())
        }
    }
}

fn run(backend: impl GpioBackend + 'static, config: &Config) -> eyre::Result<()> {
    debug!("Opening LCD via {:?}...", backend);
    let lcd = HD44780Display::with_config(backend, config.lcd.clone());
    lcd.open()?;

    let result = draw(&lcd, config);
    // Leave the panel blank and the lines low even if drawing failed
    let closed = lcd.close();
    let frames = result?;
    closed?;

    info!("Smoke test done, {} frames drawn.", frames);
    Ok(())
}

fn draw(lcd: &HD44780Display, config: &Config) -> eyre::Result<u64> {
    lcd.set_char(BELL_SLOT, &BELL)?;

    let host = System::host_name().unwrap_or_else(|| UNKNOWN_STR.to_string());
    let version = concat!("v.", env!("CARGO_PKG_VERSION"));

    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);
    let mut frames = 0;
    while Instant::now() < deadline {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let clock = format!(
            "{} {:02}:{:02}:{:02}",
            char::from(BELL_SLOT),
            now.hour(),
            now.minute(),
            now.second()
        );
        let uptime = format!("up {}s", System::uptime());

        // Rows past the display height are dropped, unchanged rows cost nothing
        lcd.display_lines(&format!("{}\n{}\n{}\n{}", host, clock, version, uptime))?;
        frames += 1;

        sleep(Duration::from_millis(250));
    }

    Ok(frames)
}
