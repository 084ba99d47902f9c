use dotenv::var;
use pilcd_gpio::lcd::hd44780::LcdConfig;
use serde::{Deserialize, Serialize};
use std::env::VarError;
use std::ffi::OsStr;
use std::path::Path;
use std::str::FromStr;

/// Which GPIO backend to drive the display through.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Memory-mapped registers through `/dev/gpiomem`.
    #[default]
    Gpiomem,
    /// Memory-mapped registers through `/dev/mem`, needs root.
    Mem,
    /// GPIO character device.
    Gpiod,
    /// No hardware, only records what would be sent.
    Mock,
}

impl FromStr for BackendKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpiomem" => Ok(BackendKind::Gpiomem),
            "mem" => Ok(BackendKind::Mem),
            "gpiod" => Ok(BackendKind::Gpiod),
            "mock" => Ok(BackendKind::Mock),
            other => Err(eyre::eyre!("Unknown backend {:?}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Device used by the gpiod backend.
    pub gpiochip: String,
    /// How long to keep the display running, in seconds.
    pub duration_secs: u64,
    pub lcd: LcdConfig,
}

impl Config {
    /// Loads the JSON file named by `CONFIG_FILE` (`pilcd.json` by default), if there is one.
    pub fn try_load() -> Option<Self> {
        let config_str = std::env::var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("pilcd.json"));
        let config_path = Path::new(config_str);
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader).ok()
        } else {
            None
        }
    }

    /// Builds the config from `PILCD_*` environment variables, keeping defaults for missing ones.
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Config::default();

        config.backend = env_or("PILCD_BACKEND", config.backend)?;
        config.gpiochip = env_or("PILCD_GPIOCHIP", config.gpiochip)?;
        config.duration_secs = env_or("PILCD_DURATION", config.duration_secs)?;

        let pins = &mut config.lcd.pins;
        pins.rs = env_or("PILCD_LCD_PIN_RS", pins.rs)?;
        pins.e = env_or("PILCD_LCD_PIN_E", pins.e)?;
        if let Some(data) = optional_var("PILCD_LCD_PINS_DATA")? {
            [pins.d4, pins.d5, pins.d6, pins.d7] = parse_pin_bus(&data)?;
        }

        config.lcd.lines = env_or("PILCD_LCD_LINES", config.lcd.lines)?;
        config.lcd.width = env_or("PILCD_LCD_WIDTH", config.lcd.width)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::default(),
            gpiochip: "/dev/gpiochip0".to_string(),
            duration_secs: 10,
            lcd: LcdConfig::default(),
        }
    }
}

fn optional_var(name: &str) -> eyre::Result<Option<String>> {
    match var(name) {
        Ok(value) => Ok(Some(value)),
        Err(dotenv::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn env_or<T>(name: &str, default: T) -> eyre::Result<T>
where
    T: FromStr,
    T::Err: Into<eyre::Report>,
{
    match optional_var(name)? {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err: T::Err| err.into().wrap_err(format!("Invalid {}", name))),
        None => Ok(default),
    }
}

fn parse_pin_bus(pin_str: &str) -> eyre::Result<[usize; 4]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre::eyre!("Invalid number of data pins"))
}
