//! Pluggable approximate nearest-neighbour candidate generation.
//!
//! An [`ApproximateIndex`] only proposes candidates; the store always ranks
//! the proposed entries with exact cosine similarity. Stores consult an
//! approximate index only for collections larger than
//! [`StoreConfig::exact_search_limit`](crate::StoreConfig::exact_search_limit).

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 4;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 2;
const MAX_TABLES: usize = 8;

/// Candidate generator maintained alongside one collection.
pub trait ApproximateIndex: Send + Sync {
    /// Insert or replace the vector stored under `chunk_id`.
    fn insert(&mut self, chunk_id: &str, vector: &[f32]);

    /// Forget `chunk_id`. No-op if unknown.
    fn remove(&mut self, chunk_id: &str);

    /// Up to `limit` chunk ids likely to be close to `query`.
    fn candidates(&self, query: &[f32], limit: usize) -> Vec<String>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds one [`ApproximateIndex`] per collection.
pub trait ApproximateIndexFactory: Send + Sync {
    /// Create an empty index for vectors of `dimension` components, sized
    /// for roughly `expected_len` entries.
    fn build(&self, dimension: usize, expected_len: usize) -> Box<dyn ApproximateIndex>;
}

/// Random-hyperplane locality-sensitive hashing.
///
/// Each table hashes a vector to the sign pattern of its projections onto
/// `num_projections` Gaussian hyperplanes. Lookups probe the query's bucket
/// and every bucket one bit away, in every table. Hyperplanes come from a
/// fixed seed, so an index rebuilt after a restart proposes the same
/// candidates.
pub struct RandomProjectionIndex {
    hyperplanes: Vec<Vec<f32>>,
    tables: Vec<HashMap<u64, HashSet<String>>>,
    signatures: HashMap<String, Vec<u64>>,
    num_projections: usize,
}

impl RandomProjectionIndex {
    /// Create an index with explicit parameters.
    pub fn new(dimension: usize, num_projections: usize, num_tables: usize) -> Self {
        let num_projections = num_projections.clamp(1, 64);
        let num_tables = num_tables.max(1);
        let mut rng = StdRng::seed_from_u64(SEED);
        let hyperplanes = (0..num_tables * num_projections)
            .map(|_| {
                Distribution::<f32>::sample_iter(StandardNormal, &mut rng).take(dimension).collect()
            })
            .collect();

        Self {
            hyperplanes,
            tables: vec![HashMap::new(); num_tables],
            signatures: HashMap::new(),
            num_projections,
        }
    }

    /// Create an index with parameters derived from the expected data size.
    pub fn for_size(dimension: usize, expected_len: usize) -> Self {
        let log_size = (expected_len.max(2) as f64).log2() as usize;
        let num_projections = (log_size + 2).clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = (log_size / 2 + 2).clamp(MIN_TABLES, MAX_TABLES);
        Self::new(dimension, num_projections, num_tables)
    }

    fn hash(&self, vector: &[f32], table: usize) -> u64 {
        let start = table * self.num_projections;
        self.hyperplanes[start..start + self.num_projections].iter().enumerate().fold(
            0u64,
            |acc, (bit, plane)| {
                let projection: f32 = plane.iter().zip(vector).map(|(a, b)| a * b).sum();
                if projection >= 0.0 { acc | (1 << bit) } else { acc }
            },
        )
    }
}

impl ApproximateIndex for RandomProjectionIndex {
    fn insert(&mut self, chunk_id: &str, vector: &[f32]) {
        self.remove(chunk_id);
        let signature: Vec<u64> = (0..self.tables.len()).map(|t| self.hash(vector, t)).collect();
        for (table, hash) in self.tables.iter_mut().zip(&signature) {
            table.entry(*hash).or_default().insert(chunk_id.to_string());
        }
        self.signatures.insert(chunk_id.to_string(), signature);
    }

    fn remove(&mut self, chunk_id: &str) {
        let Some(signature) = self.signatures.remove(chunk_id) else {
            return;
        };
        for (table, hash) in self.tables.iter_mut().zip(signature) {
            if let Some(bucket) = table.get_mut(&hash) {
                bucket.remove(chunk_id);
                if bucket.is_empty() {
                    table.remove(&hash);
                }
            }
        }
    }

    fn candidates(&self, query: &[f32], limit: usize) -> Vec<String> {
        let query_signature: Vec<u64> =
            (0..self.tables.len()).map(|t| self.hash(query, t)).collect();

        let mut found: HashSet<&str> = HashSet::new();
        for (table, &hash) in self.tables.iter().zip(&query_signature) {
            let probes =
                std::iter::once(hash).chain((0..self.num_projections).map(|b| hash ^ (1 << b)));
            for probe in probes {
                if let Some(bucket) = table.get(&probe) {
                    found.extend(bucket.iter().map(String::as_str));
                }
            }
        }

        // Closest signatures first; ids keep the order stable.
        let mut ranked: Vec<(u32, &str)> = found
            .into_iter()
            .map(|id| {
                let distance = self.signatures[id]
                    .iter()
                    .zip(&query_signature)
                    .map(|(a, b)| (a ^ b).count_ones())
                    .sum();
                (distance, id)
            })
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().take(limit).map(|(_, id)| id.to_string()).collect()
    }

    fn len(&self) -> usize {
        self.signatures.len()
    }
}

/// Factory for [`RandomProjectionIndex`] sized from the collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomProjectionFactory;

impl ApproximateIndexFactory for RandomProjectionFactory {
    fn build(&self, dimension: usize, expected_len: usize) -> Box<dyn ApproximateIndex> {
        Box::new(RandomProjectionIndex::for_size(dimension, expected_len))
    }
}
