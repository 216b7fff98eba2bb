// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dispatcher
//!
//! Claim/commit write access to a frame buffer. A writer claims a region of
//! the requested length, fills it through [`Dispatcher::buffer_mut`] and then
//! either commits or aborts it. A claim that would cross the end of a ring
//! is answered with [`Claim::Padding`]: the dispatcher has filled the tail
//! with a padding frame and the writer must claim again, which lands at
//! offset zero.
//!

use crate::Error;

use tracing::{debug, warn};

/// Consecutive padding answers tolerated by [`write_frame`].
const MAX_PADDING_RETRIES: usize = 2;

/// A claimed, not yet published region.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct ClaimedRegion {
    offset: usize,
    length: usize,
}

impl ClaimedRegion {
    pub fn new(offset: usize, length: usize) -> Self {
        ClaimedRegion { offset, length }
    }

    /// Offset of the payload inside the dispatcher's buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// Answer to a claim.
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    Claimed(ClaimedRegion),
    /// The tail was padded, claim again.
    Padding,
    /// No room, try later.
    Failed,
}

/// Write side of a frame buffer.
pub trait Dispatcher: Send {
    fn claim(&mut self, length: usize) -> Claim;

    /// Mutable view of a claimed region's payload.
    fn buffer_mut(&mut self, region: &ClaimedRegion) -> &mut [u8];

    /// Publishes the region to the reader.
    fn commit(&mut self, region: ClaimedRegion);

    /// Gives the region up. The reader skips it.
    fn abort(&mut self, region: ClaimedRegion);
}

/// Copies `payload` into a freshly claimed region and commits it.
///
/// # Returns
///
/// The payload offset of the committed frame.
///
/// # Errors
///
/// [`Error::BufferFull`] when the dispatcher has no room, including a
/// dispatcher that keeps answering with padding.
pub fn write_frame(
    dispatcher: &mut dyn Dispatcher,
    payload: &[u8],
) -> Result<usize, Error> {
    let mut paddings = 0;
    loop {
        match dispatcher.claim(payload.len()) {
            Claim::Claimed(region) => {
                dispatcher.buffer_mut(&region).copy_from_slice(payload);
                let offset = region.offset();
                dispatcher.commit(region);
                return Ok(offset);
            }
            Claim::Padding if paddings < MAX_PADDING_RETRIES => {
                paddings += 1;
                debug!("Claim hit the end of the buffer, retrying at zero.");
            }
            Claim::Padding => {
                warn!(
                    "Dispatcher answered {} claims with padding, giving up.",
                    paddings + 1
                );
                return Err(Error::BufferFull);
            }
            Claim::Failed => return Err(Error::BufferFull),
        }
    }
}
