use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const MIN_PORT: u16 = 1;
pub const MAX_PORT: u16 = 65535;

/// Inclusive port range, always `1 <= start <= end <= 65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortRangeError {
    #[error("Invalid port range format. Use: start-end (e.g. 20-80), got '{0}'")]
    Format(String),

    #[error("Invalid port range: ports must be between 1 and 65535")]
    OutOfBounds,

    #[error("Invalid port range: start {start} is greater than end {end}")]
    Inverted { start: u32, end: u32 },
}

impl PortRange {
    pub fn new(start: u32, end: u32) -> Result<Self, PortRangeError> {
        if start < MIN_PORT as u32 || end > MAX_PORT as u32 {
            return Err(PortRangeError::OutOfBounds);
        }
        if start > end {
            return Err(PortRangeError::Inverted { start, end });
        }
        Ok(Self {
            start: start as u16,
            end: end as u16,
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range. Never zero.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| PortRangeError::Format(s.to_string()))
        };

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| PortRangeError::Format(s.to_string()))?;
        PortRange::new(parse(start)?, parse(end)?)
    }
}
