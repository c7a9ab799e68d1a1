//! Variable creation parameters: fill value, chunking, compression and
//! dimension scales to attach at creation time.
//!
//! Parameters are fixed once the variable exists. Engines report back what
//! they stored through `Variable::creation_parameters`.

use obs_common::{Dimensions, ObsError, ObsResult};
use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::config::EngineConfig;
use crate::fill::{FillValue, FillValuePolicy};
use crate::frontend::Variable;
use crate::types::{StorageType, TypeDescriptor};

/// Default SZIP pixels per block.
pub const SZIP_DEFAULT_PIXELS_PER_BLOCK: u32 = 16;
/// Default SZIP option mask (entropy coding).
pub const SZIP_DEFAULT_OPTIONS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Chunking {
    #[default]
    None,
    /// Chunk shape equal to the current dimensions, capped by the engine.
    Auto,
    Explicit(Vec<u64>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    /// `None` selects the engine's default level.
    Gzip { level: Option<u8> },
    Szip { pixels_per_block: u32, options: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct VariableCreationParams {
    pub fill_value: Option<FillValue>,
    pub chunking: Chunking,
    pub compression: Compression,
    /// `(axis, scale)` pairs attached right after creation.
    pub dimension_scales: Vec<(usize, Variable)>,
}

impl VariableCreationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill_value(mut self, fill: FillValue) -> Self {
        self.fill_value = Some(fill);
        self
    }

    /// Set the fill value from a typed value.
    pub fn fill<T: StorageType>(self, value: T) -> ObsResult<Self> {
        Ok(self.with_fill_value(FillValue::new(value)?))
    }

    pub fn unset_fill_value(mut self) -> Self {
        self.fill_value = None;
        self
    }

    pub fn chunk(mut self, chunks: Vec<u64>) -> Self {
        self.chunking = Chunking::Explicit(chunks);
        self
    }

    pub fn chunk_max(mut self) -> Self {
        self.chunking = Chunking::Auto;
        self
    }

    pub fn no_chunks(mut self) -> Self {
        self.chunking = Chunking::None;
        self
    }

    pub fn compress_with_gzip(mut self, level: u8) -> Self {
        self.compression = Compression::Gzip { level: Some(level) };
        self
    }

    pub fn compress_with_default_gzip(mut self) -> Self {
        self.compression = Compression::Gzip { level: None };
        self
    }

    pub fn compress_with_szip(mut self, pixels_per_block: u32, options: u32) -> Self {
        self.compression = Compression::Szip {
            pixels_per_block,
            options,
        };
        self
    }

    pub fn no_compress(mut self) -> Self {
        self.compression = Compression::None;
        self
    }

    pub fn attach_dimension_scale(mut self, axis: usize, scale: &Variable) -> Self {
        self.dimension_scales.push((axis, scale.clone()));
        self
    }

    pub fn has_fill_value(&self) -> bool {
        self.fill_value.is_some()
    }

    pub fn chunks_enabled(&self) -> bool {
        self.chunking != Chunking::None
    }

    /// Explicit chunk shape, if one has been resolved.
    pub fn chunk_sizes(&self) -> Option<&[u64]> {
        match &self.chunking {
            Chunking::Explicit(c) => Some(c),
            _ => None,
        }
    }

    pub fn gzip_level(&self) -> Option<u8> {
        match self.compression {
            Compression::Gzip { level } => level,
            _ => None,
        }
    }

    pub fn validate(&self) -> ObsResult<()> {
        if let Chunking::Explicit(chunks) = &self.chunking {
            if chunks.contains(&0) {
                return Err(ObsError::invalid_argument("chunk extents must be > 0")
                    .with("chunks", format!("{:?}", chunks)));
            }
        }
        match self.compression {
            Compression::Gzip { level: Some(level) } if level > 9 => {
                Err(ObsError::invalid_argument("gzip level must be 0-9").with("level", level))
            }
            Compression::Szip {
                pixels_per_block, ..
            } if pixels_per_block == 0 || pixels_per_block > 32 || pixels_per_block % 2 != 0 => {
                Err(ObsError::invalid_argument(
                    "szip pixels per block must be an even number up to 32",
                )
                .with("pixels_per_block", pixels_per_block))
            }
            _ => Ok(()),
        }
    }

    /// Check the request against the engine and substitute defaults.
    ///
    /// A missing fill value is replaced by the policy default here, at
    /// creation time. Resizable variables get automatic chunking when the
    /// engine supports chunking. Scales are split off and returned.
    pub(crate) fn prepare(
        mut self,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        capabilities: &Capabilities,
        policy: FillValuePolicy,
    ) -> ObsResult<(Self, Vec<(usize, Variable)>)> {
        self.validate()?;

        match &self.fill_value {
            Some(fill) if !fill.fits(descriptor) => {
                return Err(ObsError::type_mismatch(
                    "fill value does not match the variable type",
                )
                .with("type", descriptor));
            }
            Some(_) => {}
            None => self.fill_value = Some(policy.default_for(descriptor)),
        }

        if let Chunking::Explicit(chunks) = &self.chunking {
            if chunks.len() != dims.dimensionality() {
                return Err(ObsError::invalid_dimensions(
                    "chunk shape has a different rank than the variable",
                )
                .with("chunks", format!("{:?}", chunks))
                .with("dims", format!("{:?}", dims.dims_cur())));
            }
        }
        if self.chunking == Chunking::None && dims.is_resizable() {
            if capabilities.can_chunk == crate::capabilities::CapabilityMask::Supported {
                self.chunking = Chunking::Auto;
            }
        } else if self.chunking != Chunking::None {
            capabilities.can_chunk.admit("chunking")?;
        }

        match self.compression {
            Compression::Gzip { .. } => {
                capabilities.can_compress_with_gzip.admit("gzip")?;
            }
            Compression::Szip { .. } => {
                capabilities.can_compress_with_szip.admit("szip")?;
            }
            Compression::None => {}
        }

        let scales = std::mem::take(&mut self.dimension_scales);
        Ok((self, scales))
    }

    /// Resolve engine defaults: automatic chunk shapes and the gzip level.
    pub(crate) fn resolved(mut self, dims_cur: &[u64], config: &EngineConfig) -> Self {
        if self.chunking == Chunking::Auto {
            self.chunking = Chunking::Explicit(max_chunks(dims_cur, config.max_chunk_elements));
        }
        if let Compression::Gzip { level: None } = self.compression {
            self.compression = Compression::Gzip {
                level: Some(config.default_gzip_level),
            };
        }
        self
    }
}

/// Chunk shape equal to the current dimensions (each axis at least 1),
/// halving the largest axis until the chunk holds at most `max_elements`.
pub fn max_chunks(dims_cur: &[u64], max_elements: usize) -> Vec<u64> {
    let mut chunks: Vec<u64> = dims_cur.iter().map(|d| (*d).max(1)).collect();
    let limit = max_elements.max(1) as u64;
    loop {
        let total = chunks
            .iter()
            .try_fold(1u64, |acc, c| acc.checked_mul(*c))
            .unwrap_or(u64::MAX);
        if total <= limit {
            return chunks;
        }
        let largest = chunks
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| **c)
            .map(|(i, _)| i);
        match largest {
            Some(i) if chunks[i] > 1 => chunks[i] = chunks[i].div_ceil(2),
            _ => return chunks,
        }
    }
}
