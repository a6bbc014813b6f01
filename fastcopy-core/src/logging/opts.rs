use std::fmt::Display;
use std::str::FromStr;
use std::{fmt, io};

use eyre::bail;
use serde::{Deserialize, Serialize};

use tracing_subscriber::fmt::writer::EitherWriter;
use tracing_subscriber::fmt::MakeWriter;

use crate::logging::tcp::TcpWriter;

/// Log format.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Format log in human readable format.
    #[default]
    Human,
    /// Format log in JSON format.
    JSON,
}

/// Log target.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub enum LogTarget {
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to TCP socket.
    TCP(String),
}

impl Serialize for LogTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::TCP(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl FromStr for LogTarget {
    type Err = eyre::Report;

    fn from_str(s: &str) -> eyre::Result<Self> {
        Ok(if s.to_lowercase() == "stderr" {
            Self::Stderr
        } else if let Some(addr) = s.strip_prefix("tcp://") {
            Self::TCP(addr.to_string())
        } else {
            bail!("invalid log target: {}", s)
        })
    }
}

impl LogTarget {
    pub fn into_make_writer(self) -> TargetWriter {
        match self {
            Self::Stderr => TargetWriter::Stderr,
            Self::TCP(addr) => TargetWriter::Tcp(TcpWriter::connect(addr)),
        }
    }
}

/// Writer factory of a resolved `LogTarget`.
pub enum TargetWriter {
    Stderr,
    Tcp(TcpWriter),
}

impl<'a> MakeWriter<'a> for TargetWriter {
    type Writer = EitherWriter<io::Stderr, TcpWriter>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Self::Stderr => EitherWriter::A(io::stderr()),
            Self::Tcp(w) => EitherWriter::B(w.make_writer()),
        }
    }
}
