//! Protocol revisions, capabilities and negotiation.
//!
//! Higher layers never compare revision numbers. They ask the negotiated
//! [`Capabilities`], which are derived once from the accepted revision by
//! [`ProtocolRevision::capabilities`]. Supporting a new revision means adding
//! a row to that table.

use core::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::ProtocolError;
use crate::xdr;

/// Flag marking a revision number as belonging to this protocol family.
pub const FB_PROTOCOL_FLAG: u32 = 0x8000;

/// Generic (XDR) client architecture.
pub const ARCH_GENERIC: u32 = 1;

/// Lazy packet type: responses to some operations may be deferred.
pub const PTYPE_LAZY_SEND: u32 = 5;

/// Wire protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolRevision(u32);

impl ProtocolRevision {
    /// Revision 10, the baseline.
    pub const V10: Self = Self(10);
    /// Revision 11: deferred packets.
    pub const V11: Self = Self(11);
    /// Revision 12: operation cancellation.
    pub const V12: Self = Self(12);
    /// Revision 13: compression, extended authentication, event batching.
    pub const V13: Self = Self(13);
    /// Revision 15.
    pub const V15: Self = Self(15);
    /// Revision 16: statement timeouts and server batches.
    pub const V16: Self = Self(16);
    /// Revision 17.
    pub const V17: Self = Self(17);
    /// Revision 18: scrollable cursors.
    pub const V18: Self = Self(18);
    /// Revision 19: inline blobs.
    pub const V19: Self = Self(19);

    /// Every revision this implementation speaks, lowest first.
    pub const SUPPORTED: [Self; 9] = [
        Self::V10,
        Self::V11,
        Self::V12,
        Self::V13,
        Self::V15,
        Self::V16,
        Self::V17,
        Self::V18,
        Self::V19,
    ];

    /// Create a revision from its number.
    #[must_use]
    pub const fn new(revision: u32) -> Self {
        Self(revision)
    }

    /// Revision number.
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    /// Revision as sent on the wire.
    #[must_use]
    pub const fn wire_value(self) -> u32 {
        if self.0 >= 11 {
            self.0 | FB_PROTOCOL_FLAG
        } else {
            self.0
        }
    }

    /// Revision from its wire value.
    #[must_use]
    pub const fn from_wire(value: u32) -> Self {
        Self(value & !FB_PROTOCOL_FLAG)
    }

    /// Whether this implementation supports the revision.
    #[must_use]
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Capabilities available at this revision.
    #[must_use]
    pub fn capabilities(self) -> Capabilities {
        CAPABILITY_TABLE
            .iter()
            .filter(|(since, _)| self.0 >= since.0)
            .fold(Capabilities::empty(), |acc, (_, caps)| acc | *caps)
    }
}

impl fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

bitflags! {
    /// Features that depend on the negotiated revision.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Responses to free/close may be read lazily.
        const DEFERRED_PACKETS = 1 << 0;
        /// `op_cancel` is understood.
        const CANCEL_OPERATION = 1 << 1;
        /// Wire compression may be enabled.
        const WIRE_COMPRESSION = 1 << 2;
        /// Multi-step authentication.
        const EXTENDED_AUTH = 1 << 3;
        /// Several event notifications may be coalesced.
        const EVENT_BATCHING = 1 << 4;
        /// Statement timeouts are enforced.
        const STATEMENT_TIMEOUT = 1 << 5;
        /// Server-side batch execution.
        const BATCH_EXECUTION = 1 << 6;
        /// Scrollable cursors.
        const SCROLLABLE_CURSORS = 1 << 7;
        /// Blobs may be delivered inline with fetched rows.
        const INLINE_BLOBS = 1 << 8;
    }
}

/// Revision that introduced each capability.
const CAPABILITY_TABLE: &[(ProtocolRevision, Capabilities)] = &[
    (ProtocolRevision::V11, Capabilities::DEFERRED_PACKETS),
    (ProtocolRevision::V12, Capabilities::CANCEL_OPERATION),
    (
        ProtocolRevision::V13,
        Capabilities::WIRE_COMPRESSION
            .union(Capabilities::EXTENDED_AUTH)
            .union(Capabilities::EVENT_BATCHING),
    ),
    (
        ProtocolRevision::V16,
        Capabilities::STATEMENT_TIMEOUT.union(Capabilities::BATCH_EXECUTION),
    ),
    (ProtocolRevision::V18, Capabilities::SCROLLABLE_CURSORS),
    (ProtocolRevision::V19, Capabilities::INLINE_BLOBS),
];

/// One protocol alternative offered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolOffer {
    /// Revision.
    pub revision: ProtocolRevision,
    /// Client architecture.
    pub architecture: u32,
    /// Lowest packet type accepted.
    pub min_type: u32,
    /// Highest packet type accepted; may carry the compression flag.
    pub max_type: u32,
    /// Preference weight; higher wins among equal revisions.
    pub weight: u32,
}

/// Compression flag in [`ProtocolOffer::max_type`].
pub const PTYPE_COMPRESS_FLAG: u32 = 0x100;

impl ProtocolOffer {
    /// Offer `revision` with generic architecture and lazy packets.
    #[must_use]
    pub fn new(revision: ProtocolRevision) -> Self {
        Self {
            revision,
            architecture: ARCH_GENERIC,
            min_type: 1,
            max_type: PTYPE_LAZY_SEND,
            weight: revision.number(),
        }
    }

    /// Request compression in this offer.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        if compress {
            self.max_type |= PTYPE_COMPRESS_FLAG;
        } else {
            self.max_type &= !PTYPE_COMPRESS_FLAG;
        }
        self
    }

    /// Whether compression is requested.
    #[must_use]
    pub fn wants_compression(&self) -> bool {
        self.max_type & PTYPE_COMPRESS_FLAG != 0
    }

    /// Decode an offer.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            revision: ProtocolRevision::from_wire(xdr::read_u32(src)?),
            architecture: xdr::read_u32(src)?,
            min_type: xdr::read_u32(src)?,
            max_type: xdr::read_u32(src)?,
            weight: xdr::read_u32(src)?,
        })
    }

    /// Encode an offer.
    pub fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.revision.wire_value());
        xdr::write_u32(dst, self.architecture);
        xdr::write_u32(dst, self.min_type);
        xdr::write_u32(dst, self.max_type);
        xdr::write_u32(dst, self.weight);
    }
}

/// Offers for every supported revision, lowest first.
#[must_use]
pub fn default_offers() -> Vec<ProtocolOffer> {
    ProtocolRevision::SUPPORTED
        .iter()
        .copied()
        .map(ProtocolOffer::new)
        .collect()
}

/// Pick the offer a server supporting `server_revisions` should accept.
///
/// The highest revision both sides know wins, regardless of the order in
/// which offers arrive; weight only breaks ties between offers of the same
/// revision. Returns `None` when there is no common revision.
#[must_use]
pub fn select_offer(
    offers: &[ProtocolOffer],
    server_revisions: &[ProtocolRevision],
) -> Option<ProtocolOffer> {
    offers
        .iter()
        .filter(|offer| server_revisions.contains(&offer.revision))
        .max_by_key(|offer| (offer.revision, offer.weight))
        .copied()
}

/// The revision chosen by negotiation together with its capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedProtocol {
    /// Accepted revision.
    pub revision: ProtocolRevision,
    /// Accepted architecture.
    pub architecture: u32,
    /// Whether compression was accepted.
    pub compressed: bool,
    /// Capabilities derived from the revision.
    pub capabilities: Capabilities,
}

impl NegotiatedProtocol {
    /// Build from an accepted revision.
    #[must_use]
    pub fn new(revision: ProtocolRevision, architecture: u32, compressed: bool) -> Self {
        Self {
            revision,
            architecture,
            compressed,
            capabilities: revision.capabilities(),
        }
    }

    /// Whether a capability is available.
    #[must_use]
    pub fn supports(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn revs(numbers: &[u32]) -> Vec<ProtocolRevision> {
        numbers.iter().copied().map(ProtocolRevision::new).collect()
    }

    #[test]
    fn test_selects_highest_common_revision() {
        let offers: Vec<_> = revs(&[10, 13, 15, 16])
            .into_iter()
            .map(ProtocolOffer::new)
            .collect();
        let chosen = select_offer(&offers, &revs(&[10, 13, 15])).unwrap();
        assert_eq!(chosen.revision, ProtocolRevision::V15);
    }

    #[test]
    fn test_selection_ignores_offer_order_and_weight() {
        let mut offers: Vec<_> = revs(&[16, 13, 10])
            .into_iter()
            .map(ProtocolOffer::new)
            .collect();
        offers[2].weight = 1000;
        let chosen = select_offer(&offers, &revs(&[10, 13])).unwrap();
        assert_eq!(chosen.revision, ProtocolRevision::V13);
    }

    #[test]
    fn test_no_common_revision() {
        let offers = vec![ProtocolOffer::new(ProtocolRevision::V19)];
        assert!(select_offer(&offers, &revs(&[10, 11])).is_none());
    }

    #[test]
    fn test_capability_table() {
        assert_eq!(ProtocolRevision::V10.capabilities(), Capabilities::empty());
        let v12 = ProtocolRevision::V12.capabilities();
        assert!(v12.contains(Capabilities::DEFERRED_PACKETS | Capabilities::CANCEL_OPERATION));
        assert!(!v12.contains(Capabilities::EVENT_BATCHING));

        let v15 = ProtocolRevision::V15.capabilities();
        assert!(v15.contains(Capabilities::EVENT_BATCHING));
        assert!(!v15.contains(Capabilities::STATEMENT_TIMEOUT));

        let v16 = ProtocolRevision::V16.capabilities();
        assert!(v16.contains(Capabilities::STATEMENT_TIMEOUT | Capabilities::BATCH_EXECUTION));
        assert!(!v16.contains(Capabilities::INLINE_BLOBS));

        assert_eq!(ProtocolRevision::V19.capabilities(), Capabilities::all());
    }

    #[test]
    fn test_wire_value_flag() {
        assert_eq!(ProtocolRevision::V10.wire_value(), 10);
        assert_eq!(ProtocolRevision::V16.wire_value(), 0x8010);
        assert_eq!(ProtocolRevision::from_wire(0x8010), ProtocolRevision::V16);
    }

    #[test]
    fn test_offer_encoding() {
        let offer = ProtocolOffer::new(ProtocolRevision::V13).with_compression(true);
        let mut buf = BytesMut::new();
        offer.encode(&mut buf);
        assert_eq!(buf.len(), 20);
        let decoded = ProtocolOffer::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, offer);
        assert!(decoded.wants_compression());
    }
}
