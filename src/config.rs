//! Packer configuration

use std::{fmt, str::FromStr, time::Duration};

/// Metadata container used to carry the thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// EXIF APP1 with an IFD1 thumbnail
    #[default]
    Exif,
    /// JFIF APP0 with a JFXX thumbnail extension
    Jfif,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Exif => "exif",
            OutputFormat::Jfif => "jfif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exif" => Ok(OutputFormat::Exif),
            "jfif" => Ok(OutputFormat::Jfif),
            other => Err(format!("Unknown output format: {other}")),
        }
    }
}

/// What to do with a thumbnail that does not fit in one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThumbnailPolicy {
    /// Keep as many leading thumbnail bytes as fit and log a warning
    #[default]
    Truncate,
    /// Fail the round
    Reject,
}

/// Settings for a [`JpegPacker`](crate::JpegPacker)
///
/// # Example
/// ```
/// use jpeg_packer::{OutputFormat, PackerConfig};
/// use std::time::Duration;
///
/// let config = PackerConfig::new()
///     .with_format(OutputFormat::Jfif)
///     .with_collect_timeout(Duration::from_millis(500));
/// assert_eq!(config.format(), OutputFormat::Jfif);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackerConfig {
    pub(crate) format: OutputFormat,
    pub(crate) thumbnail_policy: ThumbnailPolicy,
    pub(crate) handoff_capacity: usize,
    pub(crate) collect_timeout: Duration,
    pub(crate) eos_drain_timeout: Duration,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Exif,
            thumbnail_policy: ThumbnailPolicy::Truncate,
            handoff_capacity: 4,
            collect_timeout: Duration::from_secs(2),
            eos_drain_timeout: Duration::from_millis(100),
        }
    }
}

impl PackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the oversize thumbnail policy
    pub fn with_thumbnail_policy(mut self, policy: ThumbnailPolicy) -> Self {
        self.thumbnail_policy = policy;
        self
    }

    /// Number of complete rounds that may queue ahead of the worker (min 1)
    pub fn with_handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity.max(1);
        self
    }

    /// How long a started round waits for its remaining inputs
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    /// How long pending inputs are drained after an end-of-stream
    pub fn with_eos_drain_timeout(mut self, timeout: Duration) -> Self {
        self.eos_drain_timeout = timeout;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn thumbnail_policy(&self) -> ThumbnailPolicy {
        self.thumbnail_policy
    }

    pub fn handoff_capacity(&self) -> usize {
        self.handoff_capacity
    }

    pub fn collect_timeout(&self) -> Duration {
        self.collect_timeout
    }

    pub fn eos_drain_timeout(&self) -> Duration {
        self.eos_drain_timeout
    }
}
