// Copyright © 2024 Pathway

use std::str::FromStr;

use log::warn;

use super::error::{Error, Result};
use crate::env::{parse_env_flag, parse_env_var};

const TIMELINE_REPRESENTATION_VAR: &str = "REFLOW_TIMELINE";
const MONITOR_TIMESTAMPS_VAR: &str = "REFLOW_MONITOR_TIMESTAMPS";

/// How much of a tuple's timeline the timely memories keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimelineRepresentation {
    /// Eager folding; only the moment a tuple first appears matters downstream.
    #[default]
    FirstOnly,
    /// Lazy, resumable folding with a deterministic delivery order inside recursive groups.
    Faithful,
}

impl FromStr for TimelineRepresentation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "first_only" | "firstonly" => Ok(Self::FirstOnly),
            "faithful" => Ok(Self::Faithful),
            _ => Err(Error::UnknownTimelineRepresentation(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelyConfiguration {
    timeline_representation: TimelineRepresentation,
    monitor_timestamp_violations: bool,
}

impl Default for TimelyConfiguration {
    fn default() -> Self {
        Self {
            timeline_representation: TimelineRepresentation::default(),
            monitor_timestamp_violations: true,
        }
    }
}

impl TimelyConfiguration {
    pub fn new(timeline_representation: TimelineRepresentation) -> Self {
        Self {
            timeline_representation,
            ..Self::default()
        }
    }

    pub fn faithful() -> Self {
        Self::new(TimelineRepresentation::Faithful)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(representation) = parse_env_var(TIMELINE_REPRESENTATION_VAR)? {
            config.timeline_representation = representation;
        }
        if let Some(monitor) = parse_env_flag(MONITOR_TIMESTAMPS_VAR)? {
            if !monitor {
                warn!("timestamp monitoring disabled, ordering violations will go unreported");
            }
            config.monitor_timestamp_violations = monitor;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_timestamp_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_timestamp_violations = enabled;
        self
    }

    pub fn timeline_representation(&self) -> TimelineRepresentation {
        self.timeline_representation
    }

    pub fn is_faithful(&self) -> bool {
        self.timeline_representation == TimelineRepresentation::Faithful
    }

    pub fn monitors_timestamp_violations(&self) -> bool {
        self.monitor_timestamp_violations
    }
}
