//! Spatial correspondence between the two coupled programs.
//!
//! Both programs build a [`Locator`] over their own coupled elements and
//! query points and call [`Locator::locate`] at the same time. Each side then
//! knows:
//!
//! - for every local query point, which partner rank owns the element it
//!   landed in (or that it is *exterior*, found nowhere);
//! - for every *distant* point (a partner query point that landed on a local
//!   element), which local element holds it.
//!
//! Field values then flow along that correspondence. A forward exchange moves
//! values from the side holding the elements to the side holding the points
//! ([`Locator::send_to_points`] paired with [`Locator::recv_at_points`]); a
//! reverse exchange goes the other way ([`Locator::send_from_points`] paired
//! with [`Locator::recv_at_distant`]). Every rank exchanges one message with
//! every partner rank per call, empty or not, so calls must be matched on both
//! sides and in the same order.

mod error;
mod search;

pub use error::LocatorError;
pub use search::{ElementBounds, SearchMode};

use std::time::{Duration, Instant};

use bytemuck::Pod;
use tracing::debug;

use crate::{
    channel::{Channel, wire},
    mesh::Point,
};

use search::{Candidate, locate_point};

/// Location parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorConfig {
    /// Bounding box expansion, relative to each element's size.
    pub tolerance: f64,

    /// How partner points are matched against local elements.
    pub mode: SearchMode,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            mode: SearchMode::Containment,
        }
    }
}

/// Wall-clock times spent in location and exchanges.
///
/// The `*_comm` fields count only the time spent waiting for partner data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatorTimes {
    pub location: Duration,
    pub location_comm: Duration,
    pub exchange: Duration,
    pub exchange_comm: Duration,
}

/// A partner point located on a local element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistantPoint {
    /// Index of the point on its partner rank.
    pub point: usize,

    /// 1-based number of the local element holding the point.
    pub element: usize,

    /// Point coordinates, as sent by the partner.
    pub coords: Point,

    /// Distance from the point to the element center.
    pub distance: f64,
}

/// Spatial correspondence engine bound to one coupling channel.
#[derive(Debug)]
pub struct Locator {
    channel: Channel,
    config: LocatorConfig,
    n_points: usize,
    /// Local points owned by each partner rank, in ascending order.
    located: Vec<Vec<usize>>,
    /// Distance of each local point to its owning element (`NaN` if exterior).
    point_distances: Vec<f64>,
    n_exterior: usize,
    /// Partner points held by local elements, grouped by partner rank.
    distant: Vec<Vec<DistantPoint>>,
    times: LocatorTimes,
}

impl Locator {
    /// Creates an empty locator. Nothing is located until [`Locator::locate`].
    #[must_use]
    pub fn new(channel: Channel, config: LocatorConfig) -> Self {
        Self {
            channel,
            config,
            n_points: 0,
            located: Vec::new(),
            point_distances: Vec::new(),
            n_exterior: 0,
            distant: Vec::new(),
            times: LocatorTimes::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> LocatorConfig {
        self.config
    }

    /// Builds the correspondence between local and partner geometry.
    ///
    /// `elements` are the local elements partner points may land on;
    /// `points` are the local query points to be located on the partner.
    /// On a detached channel nothing is located and no point is exterior.
    ///
    /// # Errors
    ///
    /// Returns a [`LocatorError`] if a message fails or the partner's replies
    /// do not match the exchanged geometry.
    pub fn locate(
        &mut self,
        elements: &[ElementBounds],
        points: &[Point],
    ) -> Result<(), LocatorError> {
        let start = Instant::now();
        let mut comm = Duration::ZERO;

        self.n_points = points.len();
        let distant_ranks: Vec<usize> = self.channel.distant_ranks().collect();

        if !self.channel.is_connected() {
            self.located.clear();
            self.distant.clear();
            self.point_distances = vec![f64::NAN; points.len()];
            self.n_exterior = 0;
            return Ok(());
        }

        // Query points go to every partner rank.
        let coords: Vec<f64> = points.iter().flatten().copied().collect();
        for &rank in &distant_ranks {
            self.channel.send(rank, wire::encode(&coords))?;
        }

        let mut queries: Vec<Vec<Point>> = Vec::with_capacity(distant_ranks.len());
        for &rank in &distant_ranks {
            let bytes = timed(&mut comm, || self.channel.recv(rank))?;
            let values = wire::decode::<f64>(&bytes)?;
            if values.len() % 3 != 0 {
                return Err(LocatorError::CountMismatch {
                    what: "point coordinates",
                    expected: values.len() - values.len() % 3,
                    found: values.len(),
                });
            }
            queries.push(
                values
                    .chunks_exact(3)
                    .map(|c| [c[0], c[1], c[2]])
                    .collect(),
            );
        }

        // Offer local elements for the partner's points.
        let candidates: Vec<Vec<Option<Candidate>>> = queries
            .iter()
            .map(|points| {
                points
                    .iter()
                    .map(|&p| locate_point(elements, p, self.config.tolerance, self.config.mode))
                    .collect()
            })
            .collect();

        for (&rank, offers) in distant_ranks.iter().zip(&candidates) {
            let distances: Vec<f64> = offers
                .iter()
                .map(|offer| offer.map_or(-1.0, |c| c.distance))
                .collect();
            self.channel.send(rank, wire::encode(&distances))?;
        }

        // Keep the best offer for each local point.
        let mut owner: Vec<Option<(usize, f64)>> = vec![None; points.len()];
        for (slot, &rank) in distant_ranks.iter().enumerate() {
            let bytes = timed(&mut comm, || self.channel.recv(rank))?;
            let offers = wire::decode::<f64>(&bytes)?;
            if offers.len() != points.len() {
                return Err(LocatorError::CountMismatch {
                    what: "location offers",
                    expected: points.len(),
                    found: offers.len(),
                });
            }
            for (best, &distance) in owner.iter_mut().zip(&offers) {
                if distance >= 0.0 && best.is_none_or(|(_, d)| distance < d) {
                    *best = Some((slot, distance));
                }
            }
        }

        self.located = vec![Vec::new(); distant_ranks.len()];
        self.point_distances = vec![f64::NAN; points.len()];
        for (point, best) in owner.iter().enumerate() {
            if let Some((slot, distance)) = *best {
                self.located[slot].push(point);
                self.point_distances[point] = distance;
            }
        }
        self.n_exterior = owner.iter().filter(|best| best.is_none()).count();

        // Tell each partner rank which of its offers were taken.
        for (&rank, claimed) in distant_ranks.iter().zip(&self.located) {
            let claimed: Vec<u64> = claimed.iter().map(|&p| p as u64).collect();
            self.channel.send(rank, wire::encode(&claimed))?;
        }

        self.distant = Vec::with_capacity(distant_ranks.len());
        for (slot, &rank) in distant_ranks.iter().enumerate() {
            let bytes = timed(&mut comm, || self.channel.recv(rank))?;
            let mut held = Vec::new();
            for claimed in wire::decode::<u64>(&bytes)? {
                let point = usize::try_from(claimed).unwrap_or(usize::MAX);
                let candidate = candidates[slot]
                    .get(point)
                    .copied()
                    .flatten()
                    .ok_or(LocatorError::InvalidClaim { rank, point })?;
                held.push(DistantPoint {
                    point,
                    element: candidate.element + 1,
                    coords: queries[slot][point],
                    distance: candidate.distance,
                });
            }
            self.distant.push(held);
        }

        self.times.location += start.elapsed();
        self.times.location_comm += comm;

        debug!(
            n_points = self.n_points,
            n_exterior = self.n_exterior,
            n_distant = self.n_dist_points(),
            "location complete"
        );

        Ok(())
    }

    /// Number of local query points.
    #[must_use]
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Number of local query points not located on the partner.
    #[must_use]
    pub fn n_exterior(&self) -> usize {
        self.n_exterior
    }

    /// Number of partner points located on local elements.
    #[must_use]
    pub fn n_dist_points(&self) -> usize {
        self.distant.iter().map(Vec::len).sum()
    }

    /// Partner points located on local elements, in exchange order.
    pub fn dist_points(&self) -> impl Iterator<Item = &DistantPoint> {
        self.distant.iter().flatten()
    }

    /// 1-based local element number of each distant point, in exchange order.
    #[must_use]
    pub fn dist_locations(&self) -> Vec<usize> {
        self.dist_points().map(|p| p.element).collect()
    }

    /// Distance of each local query point to its owning partner element.
    ///
    /// Exterior points, and every point of a detached locator, hold `NaN`.
    #[must_use]
    pub fn point_distances(&self) -> &[f64] {
        &self.point_distances
    }

    #[must_use]
    pub fn times(&self) -> LocatorTimes {
        self.times
    }

    /// Sends `stride` values per distant point to the ranks owning those points.
    ///
    /// Pairs with [`Locator::recv_at_points`] on the partner.
    ///
    /// # Errors
    ///
    /// Returns a [`LocatorError`] if `values` has the wrong length or a send
    /// fails.
    pub fn send_to_points<T: Pod>(&mut self, values: &[T], stride: usize) -> Result<(), LocatorError> {
        check_len("distant values", self.n_dist_points() * stride, values.len())?;
        let start = Instant::now();

        let mut offset = 0;
        let ranks: Vec<usize> = self.channel.distant_ranks().collect();
        for (&rank, held) in ranks.iter().zip(&self.distant) {
            let end = offset + held.len() * stride;
            self.channel.send(rank, wire::encode(&values[offset..end]))?;
            offset = end;
        }

        self.times.exchange += start.elapsed();
        Ok(())
    }

    /// Receives `stride` values per located local point.
    ///
    /// Values of exterior points are left untouched. Pairs with
    /// [`Locator::send_to_points`] on the partner.
    ///
    /// # Errors
    ///
    /// Returns a [`LocatorError`] if `values` has the wrong length, a receive
    /// fails, or the partner sends the wrong number of values.
    pub fn recv_at_points<T: Pod>(
        &mut self,
        values: &mut [T],
        stride: usize,
    ) -> Result<(), LocatorError> {
        check_len("local values", self.n_points * stride, values.len())?;
        let start = Instant::now();
        let mut comm = Duration::ZERO;

        let ranks: Vec<usize> = self.channel.distant_ranks().collect();
        for (&rank, located) in ranks.iter().zip(&self.located) {
            let bytes = timed(&mut comm, || self.channel.recv(rank))?;
            let received = wire::decode::<T>(&bytes)?;
            check_len("received values", located.len() * stride, received.len())?;
            for (&point, chunk) in located.iter().zip(received.chunks_exact(stride.max(1))) {
                values[point * stride..(point + 1) * stride].copy_from_slice(chunk);
            }
        }

        self.times.exchange += start.elapsed();
        self.times.exchange_comm += comm;
        Ok(())
    }

    /// Sends `stride` values per located local point to the partner elements
    /// holding them.
    ///
    /// Pairs with [`Locator::recv_at_distant`] on the partner.
    ///
    /// # Errors
    ///
    /// Returns a [`LocatorError`] if `values` has the wrong length or a send
    /// fails.
    pub fn send_from_points<T: Pod>(&mut self, values: &[T], stride: usize) -> Result<(), LocatorError> {
        check_len("local values", self.n_points * stride, values.len())?;
        let start = Instant::now();

        let ranks: Vec<usize> = self.channel.distant_ranks().collect();
        for (&rank, located) in ranks.iter().zip(&self.located) {
            let gathered: Vec<T> = located
                .iter()
                .flat_map(|&point| values[point * stride..(point + 1) * stride].iter().copied())
                .collect();
            self.channel.send(rank, wire::encode(&gathered))?;
        }

        self.times.exchange += start.elapsed();
        Ok(())
    }

    /// Receives `stride` values per distant point, in exchange order.
    ///
    /// Pairs with [`Locator::send_from_points`] on the partner.
    ///
    /// # Errors
    ///
    /// Returns a [`LocatorError`] if `values` has the wrong length, a receive
    /// fails, or the partner sends the wrong number of values.
    pub fn recv_at_distant<T: Pod>(
        &mut self,
        values: &mut [T],
        stride: usize,
    ) -> Result<(), LocatorError> {
        check_len("distant values", self.n_dist_points() * stride, values.len())?;
        let start = Instant::now();
        let mut comm = Duration::ZERO;

        let mut offset = 0;
        let ranks: Vec<usize> = self.channel.distant_ranks().collect();
        for (&rank, held) in ranks.iter().zip(&self.distant) {
            let bytes = timed(&mut comm, || self.channel.recv(rank))?;
            let received = wire::decode::<T>(&bytes)?;
            let end = offset + held.len() * stride;
            check_len("received values", end - offset, received.len())?;
            values[offset..end].copy_from_slice(&received);
            offset = end;
        }

        self.times.exchange += start.elapsed();
        self.times.exchange_comm += comm;
        Ok(())
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), LocatorError> {
    if expected == found {
        Ok(())
    } else {
        Err(LocatorError::CountMismatch {
            what,
            expected,
            found,
        })
    }
}

fn timed<T>(total: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    *total += start.elapsed();
    result
}
