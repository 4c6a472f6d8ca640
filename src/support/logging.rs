//-
// Copyright (c) 2020, 2022, 2023, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! Process-wide logger initialisation.
//!
//! Everything in this crate logs through the `log` facade; the embedding
//! server decides where those records go by calling one of the functions
//! here once at start-up.

use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use super::error::Error;
use super::system_config::LoggingConfig;

const CONSOLE_PATTERN: &str = "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}";

/// Initialise logging as described by `config`.
///
/// If `config.config_file` is set, it names a log4rs TOML configuration which
/// is used verbatim. Otherwise, records at `config.level` and above are
/// written to stderr.
pub fn init(config: &LoggingConfig) -> Result<(), Error> {
    if let Some(ref file) = config.config_file {
        init_file(file)
    } else {
        let level = LevelFilter::from_str(&config.level).map_err(|_| {
            Error::Logging(format!("bad log level '{}'", config.level))
        })?;
        init_console(level)
    }
}

/// Initialise logging from a log4rs configuration file.
pub fn init_file(path: impl AsRef<Path>) -> Result<(), Error> {
    log4rs::init_file(path, log4rs::file::Deserializers::new())
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Initialise logging to stderr at the given level.
pub fn init_console(level: LevelFilter) -> Result<(), Error> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bad_level_rejected() {
        let config = LoggingConfig {
            config_file: None,
            level: "chatty".to_owned(),
        };
        assert_matches!(Err(Error::Logging(_)), init(&config));
    }

    #[test]
    fn missing_config_file_rejected() {
        assert_matches!(
            Err(Error::Logging(_)),
            init_file("/nonexistent/crymap-logging.toml")
        );
    }
}
