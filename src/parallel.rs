//! Parallel frame extraction.
//!
//! Distributes time points across the rayon thread pool. Each worker opens
//! its own demuxer and decoder so there is no shared mutable state, and
//! delivers outcomes through its own clone of the sink as soon as they are
//! decoded. The orchestrator reorders them.

use ::rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::decode::decode_points;
use crate::extractor::{ExtractionSettings, FrameSink};
use crate::time_point::TimePoint;

/// Decode `points` on the rayon pool.
pub(crate) fn extract_parallel(
    source: &str,
    points: &[(usize, TimePoint)],
    settings: &ExtractionSettings,
    sink: &FrameSink,
) {
    if points.is_empty() {
        return;
    }

    let chunks = split_into_chunks(points, ::rayon::current_num_threads());
    log::debug!(
        "Decoding {} time point(s) in {} parallel chunk(s)",
        points.len(),
        chunks.len()
    );

    chunks.into_par_iter().for_each(|chunk| {
        let sink = sink.clone();
        decode_points(source, chunk, settings, &sink);
    });
}

/// Split into at most `workers` contiguous chunks. Neighbouring time points
/// stay together so each worker decodes forward through one region.
fn split_into_chunks(
    points: &[(usize, TimePoint)],
    workers: usize,
) -> Vec<&[(usize, TimePoint)]> {
    let workers = workers.max(1);
    let chunk_size = points.len().div_ceil(workers).max(1);
    points.chunks(chunk_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(count: usize) -> Vec<(usize, TimePoint)> {
        (0..count)
            .map(|index| (index, TimePoint::new(index as i64, 10)))
            .collect()
    }

    #[test]
    fn chunks_cover_every_point_in_order() {
        let points = points(10);
        let chunks = split_into_chunks(&points, 3);
        assert_eq!(chunks.len(), 3);
        let flattened: Vec<usize> = chunks.iter().flat_map(|c| c.iter().map(|p| p.0)).collect();
        assert_eq!(flattened, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn more_workers_than_points() {
        let points = points(2);
        assert_eq!(split_into_chunks(&points, 8).len(), 2);
        assert_eq!(split_into_chunks(&points, 0).len(), 1);
    }
}
