//! Conversion of the active channel set into one winning interaction length.

use ordered_float::NotNan;
use rand::RngCore;
use tracing::debug;

use crate::core::geometry::Object;
use crate::core::particle::Particle;
use crate::core::process::{ProcessEnv, ProcessId, ProcessRegistry};
use crate::core::rng::{RngPool, Stream};
use crate::error::{Error, Result};

/// One competing interaction for the current medium. Built per sampling call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionChannel {
    /// Process that samples and applies the channel; `None` is skipped.
    pub process: Option<ProcessId>,
    /// Macroscopic cross-section (m^-1).
    pub macroscopic_cross_section: f64,
}

impl InteractionChannel {
    /// Channel owned by `process`.
    pub fn new(process: ProcessId, macroscopic_cross_section: f64) -> Self {
        Self {
            process: Some(process),
            macroscopic_cross_section,
        }
    }
}

/// Distance sampled by one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelLength {
    pub process: ProcessId,
    /// Distance (m); may be infinite or non-positive before selection.
    pub length: f64,
}

/// Winning interaction of a sampling call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionSample {
    /// Distance (m) to the interaction, infinite for the sentinel.
    pub length: f64,
    /// Winning process, `None` for the sentinel.
    pub process: Option<ProcessId>,
}

impl InteractionSample {
    /// Sentinel: nothing will interact in this medium.
    pub const NONE: Self = Self {
        length: f64::INFINITY,
        process: None,
    };

    /// True for [`InteractionSample::NONE`] and any sample without a process.
    pub fn is_none(&self) -> bool {
        self.process.is_none()
    }
}

/// Channels of every applicable process, in registry order.
///
/// Errors: `Error::InvalidCrossSection` if any channel carries a negative or
/// non-finite cross-section.
pub fn build_interaction_channels(
    registry: &ProcessRegistry,
    particle: &Particle,
    medium: Option<&Object>,
    env: &ProcessEnv<'_>,
) -> Result<Vec<InteractionChannel>> {
    let mut channels = Vec::new();
    for process in registry.determine_active_interaction_processes(particle, medium, env) {
        let Some(channel) = process.build_channel(particle, medium, env)? else {
            continue;
        };
        let sigma = channel.macroscopic_cross_section;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(Error::InvalidCrossSection {
                process: process.id().name(),
                value: sigma,
            });
        }
        channels.push(channel);
    }
    Ok(channels)
}

/// Per-channel sampled lengths; channels without a registered process are skipped.
pub fn compute_channel_interaction_lengths(
    registry: &ProcessRegistry,
    particle: &Particle,
    medium: Option<&Object>,
    channels: &[InteractionChannel],
    rng: &mut dyn RngCore,
) -> Vec<ChannelLength> {
    channels
        .iter()
        .filter_map(|channel| {
            let id = channel.process?;
            let process = registry.get(id)?;
            Some(ChannelLength {
                process: id,
                length: process.sample_length(particle, medium, channel, rng),
            })
        })
        .collect()
}

/// Shortest finite positive length; ties keep the earliest channel.
pub fn select_shortest(lengths: &[ChannelLength]) -> InteractionSample {
    lengths
        .iter()
        .filter(|c| c.length.is_finite() && c.length > 0.0)
        .filter_map(|c| NotNan::new(c.length).ok().map(|len| (len, c.process)))
        .min_by_key(|(len, _)| *len)
        .map(|(len, process)| InteractionSample {
            length: len.into_inner(),
            process: Some(process),
        })
        .unwrap_or(InteractionSample::NONE)
}

/// Sample the next discrete interaction for `particle` in `medium`.
pub fn sample_interaction_event(
    registry: &ProcessRegistry,
    particle: &Particle,
    medium: Option<&Object>,
    env: &ProcessEnv<'_>,
    rng: &mut RngPool,
) -> Result<InteractionSample> {
    let channels = build_interaction_channels(registry, particle, medium, env)?;
    if channels.is_empty() {
        return Ok(InteractionSample::NONE);
    }
    let lengths = compute_channel_interaction_lengths(
        registry,
        particle,
        medium,
        &channels,
        rng.stream(Stream::DiscreteInteractions),
    );
    let sample = select_shortest(&lengths);
    debug!(
        particle = particle.id(),
        channels = channels.len(),
        length = sample.length,
        process = ?sample.process,
        "sampled interaction length"
    );
    Ok(sample)
}
