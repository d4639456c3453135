use core::fmt;

/// Length of an Ethernet II header: two addresses plus the ethertype.
pub const HEADER_LEN: usize = 14;

enum_with_unknown! {
    /// Ethernet protocol type.
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp = 0x0806,
        Ipv6 = 0x86DD
    }
}

impl Default for EtherType {
    fn default() -> EtherType {
        EtherType::Unknown(0)
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Arp => write!(f, "ARP"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Unknown(id) => write!(f, "0x{:04x}", id),
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address, `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// The all-zero address, used as an "invalid" placeholder.
    pub const ZERO: Address = Address([0x00; 6]);

    /// Construct an Ethernet address from a six-octet sequence.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Parse the canonical text form `hh:hh:hh:hh:hh:hh`.
    ///
    /// `-` is accepted as the separator as well, but the same one must be
    /// used throughout. Any other length, separator or non-hex digit yields
    /// [`Address::ZERO`]; parsing is total, like the rest of the codec.
    pub fn from_text(text: &str) -> Address {
        let text = text.as_bytes();
        if text.len() != 17 {
            return Address::ZERO;
        }
        let separator = text[2];
        if separator != b':' && separator != b'-' {
            return Address::ZERO;
        }

        let mut bytes = [0; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let at = i * 3;
            if i > 0 && text[at - 1] != separator {
                return Address::ZERO;
            }
            let hi = (text[at] as char).to_digit(16);
            let lo = (text[at + 1] as char).to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => *byte = (hi << 4 | lo) as u8,
                _ => return Address::ZERO,
            }
        }
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the address is all zeroes.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Query whether the "multicast" bit in the first octet is set.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
        )
    }
}

/// A decoded Ethernet II frame: both addresses, the ethertype and an owned
/// payload, without the trailing frame check sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Frame {
    dst_addr: Address,
    src_addr: Address,
    ethertype: EtherType,
    payload: Vec<u8>,
}

impl Frame {
    /// Construct a frame from its parts. The payload may be empty; the codec
    /// imposes no size bounds of its own.
    pub fn new(dst_addr: Address, src_addr: Address, ethertype: EtherType, payload: Vec<u8>) -> Frame {
        Frame {
            dst_addr,
            src_addr,
            ethertype,
            payload,
        }
    }

    /// Parse a buffer into a frame.
    ///
    /// Parsing is total: a buffer shorter than [`HEADER_LEN`] decodes to the
    /// all-zero frame rather than an error. The zero source address is
    /// harmless to learn and the zero destination is neither broadcast nor
    /// likely to be bound, so such frames fall through the switch untouched.
    pub fn parse(data: &[u8]) -> Frame {
        if data.len() < HEADER_LEN {
            return Frame::default();
        }
        Frame {
            dst_addr: Address::from_bytes(&data[0..6]),
            src_addr: Address::from_bytes(&data[6..12]),
            ethertype: EtherType::from(u16::from_be_bytes([data[12], data[13]])),
            payload: data[HEADER_LEN..].to_vec(),
        }
    }

    /// Emit the wire form: `dst || src || ethertype (big endian) || payload`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.buffer_len());
        buffer.extend_from_slice(self.dst_addr.as_bytes());
        buffer.extend_from_slice(self.src_addr.as_bytes());
        buffer.extend_from_slice(&u16::from(self.ethertype).to_be_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer
    }

    /// Length of the wire form.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// The destination address.
    pub const fn dst_addr(&self) -> Address {
        self.dst_addr
    }

    /// The source address.
    pub const fn src_addr(&self) -> Address {
        self.src_addr
    }

    /// The ethertype.
    pub const fn ethertype(&self) -> EtherType {
        self.ethertype
    }

    /// The payload, everything after the header.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "EthernetII src={} dst={} type={}",
            self.src_addr, self.dst_addr, self.ethertype
        )
    }
}
