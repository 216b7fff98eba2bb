// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Ring buffer
//!
//! Single-producer, single-consumer byte ring carrying length-prefixed frames.
//! The transport receive path writes into the [`Producer`] through the
//! [`Dispatcher`] contract, a collector actor reads from the [`Consumer`].
//!
//! Every frame starts with an 8-byte header: the frame length (header plus
//! payload) and the frame type, both `u32` little endian. Frames are aligned
//! to 8 bytes. A frame never wraps: when it would cross the end of the buffer
//! the remaining tail is filled with a single padding frame.
//!

use crate::{
    Error, InboundMessages,
    dispatcher::{Claim, ClaimedRegion, Dispatcher},
};

use tracing::debug;

use std::{
    cell::UnsafeCell,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Frame header length.
pub const FRAME_HEADER_LENGTH: usize = 8;
/// Frame alignment.
pub const FRAME_ALIGNMENT: usize = 8;
/// Frames handed over by one [`Consumer`] poll.
pub const DEFAULT_FRAMES_PER_POLL: usize = 64;

const TYPE_MESSAGE: u32 = 0;
const TYPE_PADDING: u32 = 1;

/// Total ring space taken by a frame with `length` payload bytes.
pub fn aligned_frame_length(length: usize) -> usize {
    (length + FRAME_HEADER_LENGTH + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

struct Shared {
    data: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    /// Consumer position, only written by the consumer.
    head: AtomicU64,
    /// Published producer position, only written by the producer.
    tail: AtomicU64,
}

// SAFETY: exactly one `Producer` and one `Consumer` share a `Shared`. Neither
// is `Clone` and both touch the bytes only through `&mut self`, so each side
// runs on one thread at a time. The producer only writes bytes in
// `[tail, head + capacity)` and the consumer only reads bytes in
// `[head, tail)`. The producer publishes its writes with a release store on
// `tail` that the consumer loads with acquire; the consumer hands bytes back
// with a release store on `head` that the producer loads with acquire. No
// byte is therefore accessed by both sides at the same time, and every read
// happens after the write it observes.
unsafe impl Sync for Shared {}

impl Shared {
    fn new(capacity: usize) -> Self {
        let data = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Shared {
            data,
            capacity,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        }
    }

    fn index(&self, position: u64) -> usize {
        (position % self.capacity as u64) as usize
    }

    /// # Safety
    ///
    /// The range must be inside the buffer and owned by the caller's side.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self, offset: usize, length: usize) -> &mut [u8] {
        debug_assert!(offset + length <= self.capacity);
        // SAFETY: `UnsafeCell<u8>` has the layout of `u8`, so the cells form
        // a valid `[u8]`. The caller guarantees the range is in bounds and
        // owned by its side, so no other reference to it exists.
        unsafe {
            std::slice::from_raw_parts_mut(
                UnsafeCell::raw_get(self.data.as_ptr().add(offset)),
                length,
            )
        }
    }

    /// # Safety
    ///
    /// The range must be inside the buffer and published to the consumer.
    unsafe fn slice(&self, offset: usize, length: usize) -> &[u8] {
        debug_assert!(offset + length <= self.capacity);
        // SAFETY: layout as for `slice_mut`. The caller guarantees the range
        // was published by an acquire load of `tail`, so the producer no
        // longer writes it.
        unsafe {
            std::slice::from_raw_parts(
                UnsafeCell::raw_get(self.data.as_ptr().add(offset)) as *const u8,
                length,
            )
        }
    }

    /// # Safety
    ///
    /// Producer side only, `index` must be inside the free region.
    unsafe fn write_header(&self, index: usize, length: usize, frame_type: u32) {
        // SAFETY: the caller guarantees the producer owns the header bytes.
        let header = unsafe { self.slice_mut(index, FRAME_HEADER_LENGTH) };
        header[..4].copy_from_slice(&(length as u32).to_le_bytes());
        header[4..].copy_from_slice(&frame_type.to_le_bytes());
    }

    /// # Safety
    ///
    /// Consumer side only, `index` must be inside the published region.
    unsafe fn read_header(&self, index: usize) -> (usize, u32) {
        // SAFETY: the caller guarantees the header bytes are published.
        let header = unsafe { self.slice(index, FRAME_HEADER_LENGTH) };
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let frame_type =
            u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        (length as usize, frame_type)
    }
}

/// Creates a ring of `capacity` bytes.
///
/// # Errors
///
/// [`Error::InvalidCapacity`] when `capacity` is zero or not a multiple of
/// [`FRAME_ALIGNMENT`].
pub fn ring_buffer(capacity: usize) -> Result<(Producer, Consumer), Error> {
    if capacity == 0 || capacity % FRAME_ALIGNMENT != 0 {
        return Err(Error::InvalidCapacity(capacity));
    }
    let shared = Arc::new(Shared::new(capacity));
    debug!("Created ring buffer of {} bytes.", capacity);
    Ok((
        Producer {
            shared: shared.clone(),
            pending: None,
        },
        Consumer {
            shared,
            frames_per_poll: DEFAULT_FRAMES_PER_POLL,
        },
    ))
}

/// A claim waiting for commit or abort.
#[derive(Debug, Clone, Copy)]
struct PendingClaim {
    position: u64,
    aligned_length: usize,
}

/// Write side of the ring.
pub struct Producer {
    shared: Arc<Shared>,
    pending: Option<PendingClaim>,
}

impl Producer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn publish(&mut self, region: &ClaimedRegion, length: usize, frame_type: u32) {
        let Some(pending) = self.pending.take() else {
            debug!("Ignoring a region that was never claimed.");
            return;
        };
        let index = self.shared.index(pending.position);
        debug_assert_eq!(index + FRAME_HEADER_LENGTH, region.offset());
        // SAFETY: this is the only producer. The claimed range lies in
        // `[tail, head + capacity)`, checked by `claim` against an acquire
        // load of `head`, and stays invisible to the consumer until the
        // release store on `tail` below.
        unsafe { self.shared.write_header(index, length, frame_type) };
        self.shared.tail.store(
            pending.position + pending.aligned_length as u64,
            Ordering::Release,
        );
    }
}

impl Dispatcher for Producer {
    fn claim(&mut self, length: usize) -> Claim {
        let capacity = self.shared.capacity;
        let aligned_length = aligned_frame_length(length);
        if self.pending.is_some() || aligned_length > capacity {
            return Claim::Failed;
        }

        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        let free = capacity - (tail - head) as usize;
        let index = self.shared.index(tail);
        let to_end = capacity - index;

        if aligned_length > to_end {
            if to_end > free {
                return Claim::Failed;
            }
            // SAFETY: this is the only producer, and `[index, capacity)` is
            // free per the acquire load of `head` above. The consumer sees
            // it only after the release store on `tail` that follows.
            unsafe { self.shared.write_header(index, to_end, TYPE_PADDING) };
            self.shared
                .tail
                .store(tail + to_end as u64, Ordering::Release);
            return Claim::Padding;
        }
        if aligned_length > free {
            return Claim::Failed;
        }

        self.pending = Some(PendingClaim {
            position: tail,
            aligned_length,
        });
        Claim::Claimed(ClaimedRegion::new(index + FRAME_HEADER_LENGTH, length))
    }

    fn buffer_mut(&mut self, region: &ClaimedRegion) -> &mut [u8] {
        // SAFETY: `&mut self` makes this the only access on the producer
        // side. The region was handed out by `claim` from the free range and
        // `tail` has not moved past it, so the consumer never reads it.
        unsafe { self.shared.slice_mut(region.offset(), region.length()) }
    }

    fn commit(&mut self, region: ClaimedRegion) {
        let length = region.length() + FRAME_HEADER_LENGTH;
        self.publish(&region, length, TYPE_MESSAGE);
    }

    fn abort(&mut self, region: ClaimedRegion) {
        let length = self
            .pending
            .map(|pending| pending.aligned_length)
            .unwrap_or_default();
        self.publish(&region, length, TYPE_PADDING);
    }
}

/// Read side of the ring.
pub struct Consumer {
    shared: Arc<Shared>,
    frames_per_poll: usize,
}

impl Consumer {
    /// Bounds the number of frames one poll hands over.
    pub fn with_frames_per_poll(mut self, frames_per_poll: usize) -> Self {
        self.frames_per_poll = frames_per_poll.max(1);
        self
    }

    /// Bytes published but not yet consumed, padding included.
    pub fn pending_bytes(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Acquire);
        let head = self.shared.head.load(Ordering::Relaxed);
        (tail - head) as usize
    }
}

impl InboundMessages for Consumer {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8])) -> usize {
        let tail = self.shared.tail.load(Ordering::Acquire);
        let mut head = self.shared.head.load(Ordering::Relaxed);
        let mut frames = 0;

        while head < tail && frames < self.frames_per_poll {
            let index = self.shared.index(head);
            // SAFETY: `&mut self` makes this the only consumer access.
            // `[head, tail)` was published by the release store on `tail`
            // matched by the acquire load above, and the producer does not
            // write it again before the release store on `head` below.
            let (length, frame_type) = unsafe { self.shared.read_header(index) };
            if frame_type == TYPE_MESSAGE {
                // SAFETY: as above. The payload follows its header inside
                // the same published frame.
                let payload = unsafe {
                    self.shared.slice(
                        index + FRAME_HEADER_LENGTH,
                        length - FRAME_HEADER_LENGTH,
                    )
                };
                handler(payload);
                frames += 1;
            }
            head += aligned_frame_length(length - FRAME_HEADER_LENGTH) as u64;
        }

        self.shared.head.store(head, Ordering::Release);
        frames
    }
}
