//! Affine hash rows over the Mersenne prime `2^61 - 1`.

use std::net::IpAddr;

use rand::Rng;

/// `2^61 - 1`.
pub const MERSENNE_61: u64 = (1 << 61) - 1;

/// Upper bound of the random multiplier `a` (lower bound 1).
pub const MAX_MULTIPLIER: u64 = 10_000;

/// Upper bound of the random offset `b` (lower bound 0).
pub const MAX_OFFSET: u64 = 10_000;

/// `h(k) = ((a·k + b) mod p) mod c + 1`, with output in `[1, c]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashRow {
    a: u64,
    b: u64,
    cells: usize,
}

impl HashRow {
    /// `cells` must be non-zero; the sketch config validates it.
    pub fn new(a: u64, b: u64, cells: usize) -> Self {
        Self {
            a,
            b,
            cells: cells.max(1),
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R, cells: usize) -> Self {
        let a = rng.gen_range(1..=MAX_MULTIPLIER);
        let b = rng.gen_range(0..=MAX_OFFSET);
        Self::new(a, b, cells)
    }

    pub fn hash(&self, key: u64) -> usize {
        let p = MERSENNE_61 as u128;
        let mixed = (self.a as u128 * key as u128 + self.b as u128) % p;
        (mixed % self.cells as u128) as usize + 1
    }

    /// Zero-based cell index.
    pub fn slot(&self, key: u64) -> usize {
        self.hash(key) - 1
    }

    pub fn cells(&self) -> usize {
        self.cells
    }
}

/// Numeric sketch key for an address: the IPv4 value itself, or the
/// leading 8 bytes of a blake3 digest for IPv6.
pub fn sketch_key(ip: IpAddr) -> u64 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u64,
        IpAddr::V6(v6) => {
            let digest = blake3::hash(&v6.octets());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest.as_bytes()[..8]);
            u64::from_be_bytes(head)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn known_values() {
        // a=5, b=7, c=100
        let row = HashRow::new(5, 7, 100);
        let k3 = sketch_key("10.0.0.3".parse().unwrap());
        let k4 = sketch_key("10.0.0.4".parse().unwrap());
        assert_eq!(k3, 167_772_163);
        assert_eq!(row.hash(k3), ((5 * k3 + 7) % 100) as usize + 1);
        assert_eq!(row.hash(k4), ((5 * k4 + 7) % 100) as usize + 1);
    }

    #[test]
    fn output_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for cells in [1, 2, 7, 64] {
            let row = HashRow::random(&mut rng, cells);
            for key in [0, 1, u32::MAX as u64, u64::MAX, MERSENNE_61] {
                let h = row.hash(key);
                assert!((1..=cells).contains(&h), "h={} cells={}", h, cells);
            }
        }
    }

    #[test]
    fn random_parameters_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let row = HashRow::random(&mut rng, 10);
            assert!((1..=MAX_MULTIPLIER).contains(&row.a));
            assert!(row.b <= MAX_OFFSET);
        }
    }

    #[test]
    fn ipv6_keys_are_stable() {
        let ip: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(sketch_key(ip), sketch_key(ip));
        assert_ne!(sketch_key(ip), sketch_key("fe80::2".parse().unwrap()));
    }
}
