//! Proxy relatives of a tile.

use bitflags::bitflags;

bitflags! {
    /// Relatives currently pinned as stand-ins for a tile.
    ///
    /// Child bits follow [`crate::coord::TileKey::child`] order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProxyMask: u8 {
        const CHILD1 = 1 << 0;
        const CHILD2 = 1 << 1;
        const CHILD3 = 1 << 2;
        const CHILD4 = 1 << 3;
        const PARENT = 1 << 4;
        const GRANDPARENT = 1 << 5;

        const CHILDREN = Self::CHILD1.bits()
            | Self::CHILD2.bits()
            | Self::CHILD3.bits()
            | Self::CHILD4.bits();
    }
}

impl ProxyMask {
    /// Bit for the child at `index` (0..4), empty for any other index.
    #[inline]
    pub fn child(index: usize) -> ProxyMask {
        if index > 3 {
            return ProxyMask::empty();
        }
        ProxyMask::from_bits_truncate(1 << index)
    }
}

/// Names one relative a tile may be drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proxy {
    Parent,
    Grandparent,
    Child(usize),
}

impl Proxy {
    /// Every relative, in the order lock pins them.
    pub const ALL: [Proxy; 6] = [
        Proxy::Parent,
        Proxy::Grandparent,
        Proxy::Child(0),
        Proxy::Child(1),
        Proxy::Child(2),
        Proxy::Child(3),
    ];

    pub fn mask(self) -> ProxyMask {
        match self {
            Proxy::Parent => ProxyMask::PARENT,
            Proxy::Grandparent => ProxyMask::GRANDPARENT,
            Proxy::Child(i) => ProxyMask::child(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_bits() {
        assert_eq!(ProxyMask::child(0), ProxyMask::CHILD1);
        assert_eq!(ProxyMask::child(3), ProxyMask::CHILD4);
        assert!(ProxyMask::child(4).is_empty());
        assert!(ProxyMask::child(7).is_empty());
        assert!(ProxyMask::child(8).is_empty());
        assert!(ProxyMask::child(usize::MAX).is_empty());
    }

    #[test]
    fn test_proxy_masks_are_distinct() {
        let mut seen = ProxyMask::empty();
        for p in Proxy::ALL {
            assert!(!seen.intersects(p.mask()));
            seen |= p.mask();
        }
        assert_eq!(seen, ProxyMask::all());
    }
}
