use std::sync::Arc;

use custos_primitives::{Endpoint, EndpointError};
use rand::seq::SliceRandom;
use rand::Rng;

/// Immutable, non-empty list of servers, shuffled once at construction.
///
/// Concurrently starting clients spread across servers while a single
/// client's retry order stays fixed.
#[derive(Clone, Debug)]
pub struct EndpointSet {
    endpoints: Arc<[Endpoint]>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, EndpointError> {
        Self::with_rng(endpoints, &mut rand::thread_rng())
    }

    pub fn with_rng<R>(mut endpoints: Vec<Endpoint>, rng: &mut R) -> Result<Self, EndpointError>
    where
        R: Rng + ?Sized,
    {
        if endpoints.is_empty() {
            return Err(EndpointError::Empty);
        }

        endpoints.shuffle(rng);

        Ok(Self {
            endpoints: endpoints.into(),
        })
    }

    /// Parses a comma-separated server list, see [`Endpoint::parse_list`].
    pub fn parse(list: &str, default_port: u16) -> Result<Self, EndpointError> {
        Self::new(Endpoint::parse_list(list, default_port)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// One full pass over the set starting at `start`, wrapping around.
    pub fn cycle_from(&self, start: usize) -> impl Iterator<Item = (usize, &Endpoint)> {
        let len = self.endpoints.len();

        (0..len).map(move |offset| {
            let index = (start + offset) % len;
            (index, &self.endpoints[index])
        })
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_err_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn hosts(count: usize) -> Vec<Endpoint> {
        (0..count)
            .map(|i| Endpoint::new(format!("host-{i}"), 8038))
            .collect()
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert_err_eq!(EndpointSet::new(Vec::new()), EndpointError::Empty);
        assert_err_eq!(EndpointSet::parse(" , ", 8038), EndpointError::Empty);
    }

    #[test]
    fn test_shuffle_keeps_every_endpoint() {
        let set = EndpointSet::with_rng(hosts(8), &mut StdRng::seed_from_u64(7)).unwrap();

        let mut seen: Vec<_> = set.iter().cloned().collect();
        seen.sort_by(|a, b| a.host.cmp(&b.host));

        assert_eq!(seen, hosts(8));
    }

    #[test]
    fn test_same_seed_same_order() {
        let a = EndpointSet::with_rng(hosts(5), &mut StdRng::seed_from_u64(42)).unwrap();
        let b = EndpointSet::with_rng(hosts(5), &mut StdRng::seed_from_u64(42)).unwrap();

        assert!(a.iter().eq(b.iter()));
    }

    #[test]
    fn test_cycle_wraps_around() {
        let set = EndpointSet::with_rng(hosts(3), &mut StdRng::seed_from_u64(1)).unwrap();

        let order: Vec<_> = set.cycle_from(2).map(|(index, _)| index).collect();
        assert_eq!(order, [2, 0, 1]);

        let order: Vec<_> = set.cycle_from(0).map(|(index, _)| index).collect();
        assert_eq!(order, [0, 1, 2]);
    }
}
