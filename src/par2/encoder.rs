//! Reed-Solomon parity generation over GF(2^8)
//!
//! The field caps one Vandermonde encoding at 256 total shards, while a
//! recovery set routinely has hundreds of data slices. Data slices are
//! therefore consumed in batches of at most `256 - parity` slices; each
//! batch produces `parity` shards which are XOR-merged into the running
//! accumulators. XOR is commutative, so batch order (and any batch-level
//! parallelism) cannot change the output bytes.

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::error::{PostError, Result};

/// Most shards one GF(2^8) encoding can carry
const FIELD_SHARD_LIMIT: usize = 256;

/// Streaming parity encoder
///
/// Feed data slices of exactly `slice_size` bytes in order, then call
/// [`finish`](Self::finish) for the parity shards.
pub struct ParityEncoder {
    slice_size: usize,
    parity: usize,
    batch_size: usize,
    pending: Vec<Vec<u8>>,
    acc: Vec<Vec<u8>>,
}

impl ParityEncoder {
    /// Create an encoder for `parity` shards of `slice_size` bytes
    ///
    /// # Errors
    ///
    /// [`PostError::EncoderFailure`] when the parity count does not leave
    /// room for even a single data shard in the field.
    pub fn new(slice_size: usize, parity: usize) -> Result<Self> {
        if parity == 0 {
            return Err(PostError::EncoderFailure(
                "parity shard count must be positive".to_string(),
            ));
        }
        if parity >= FIELD_SHARD_LIMIT {
            return Err(PostError::EncoderFailure(format!(
                "{} parity shards exceed the GF(2^8) limit of {} total shards",
                parity, FIELD_SHARD_LIMIT
            )));
        }

        let batch_size = FIELD_SHARD_LIMIT - parity;
        Ok(Self {
            slice_size,
            parity,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            acc: vec![vec![0u8; slice_size]; parity],
        })
    }

    /// Largest number of data slices one encoding round can take
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Feed the next data slice (must be exactly `slice_size` bytes)
    pub fn add_slice(&mut self, slice: Vec<u8>) -> Result<()> {
        debug_assert_eq!(slice.len(), self.slice_size);
        self.pending.push(slice);
        if self.pending.len() == self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Encode and return the parity shards
    pub fn finish(mut self) -> Result<Vec<Vec<u8>>> {
        if !self.pending.is_empty() {
            self.flush_batch()?;
        }
        Ok(self.acc)
    }

    fn flush_batch(&mut self) -> Result<()> {
        let data_len = self.pending.len();
        let mut shards = std::mem::take(&mut self.pending);
        shards.resize(data_len + self.parity, vec![0u8; self.slice_size]);

        let rs = ReedSolomon::new(data_len, self.parity)
            .map_err(|e| PostError::EncoderFailure(e.to_string()))?;
        rs.encode(&mut shards)
            .map_err(|e| PostError::EncoderFailure(e.to_string()))?;

        for (acc, parity_shard) in self.acc.iter_mut().zip(&shards[data_len..]) {
            xor_into(acc, parity_shard);
        }

        self.pending = Vec::with_capacity(self.batch_size);
        Ok(())
    }
}

/// Encode all slices at once, spreading batches across worker threads
///
/// Produces exactly the bytes the streaming encoder would: each thread
/// accumulates the parity of its batch range and the partials are XOR-merged
/// at the end.
pub fn encode_parallel(
    slices: Vec<Vec<u8>>,
    slice_size: usize,
    parity: usize,
) -> Result<Vec<Vec<u8>>> {
    // Validate the geometry once up front
    let probe = ParityEncoder::new(slice_size, parity)?;
    let batch_size = probe.batch_size();
    drop(probe);

    let batches: Vec<&[Vec<u8>]> = slices.chunks(batch_size).collect();
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(batches.len().max(1));

    if workers <= 1 {
        let mut encoder = ParityEncoder::new(slice_size, parity)?;
        for slice in slices {
            encoder.add_slice(slice)?;
        }
        return encoder.finish();
    }

    let per_worker = batches.len().div_ceil(workers);
    let partials: Vec<Result<Vec<Vec<u8>>>> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for range in batches.chunks(per_worker) {
            handles.push(scope.spawn(move || -> Result<Vec<Vec<u8>>> {
                let mut encoder = ParityEncoder::new(slice_size, parity)?;
                for batch in range {
                    for slice in *batch {
                        encoder.add_slice(slice.clone())?;
                    }
                    // Every range chunk except possibly the global last is a
                    // full batch, so flush boundaries line up with the
                    // sequential encoder
                }
                encoder.finish()
            }));
        }
        handles.into_iter().map(|h| h.join().expect("parity worker panicked")).collect()
    });

    let mut acc = vec![vec![0u8; slice_size]; parity];
    for partial in partials {
        let partial = partial?;
        for (dst, src) in acc.iter_mut().zip(&partial) {
            xor_into(dst, src);
        }
    }
    Ok(acc)
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
