//! RDM (ANSI E1.20) protocol definitions: identifiers, framing constants
//! and the wire codec.

pub mod dub;
pub mod packet;

use std::fmt;
use std::hash::BuildHasher;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// RDM start code, the first slot of every RDM frame on the wire.
pub const SC_RDM: u8 = 0xCC;
/// Sub-start code, the first byte of the message body.
pub const SC_SUB_MESSAGE: u8 = 0x01;

/// Length of a UID on the wire.
pub const UID_LENGTH: usize = 6;
/// Largest admissible parameter data length.
pub const RDM_MAX_PDL: usize = 231;
/// Size of a maximal encoded frame including the start code (`26 + pdl`).
pub const RDM_FRAME_MAX: usize = 26 + RDM_MAX_PDL;
/// Size of the transport's response buffer.
pub const RDM_RESPONSE_MAX: usize = 512;

/// Open Lighting ESTA manufacturer code, used for controller UIDs.
pub const ESTA_OPEN_LIGHTING: u16 = 0x7A70;

pub const PID_DISC_UNIQUE_BRANCH: u16 = 0x0001;
pub const PID_DISC_MUTE: u16 = 0x0002;
pub const PID_DISC_UN_MUTE: u16 = 0x0003;
pub const PID_PROXIED_DEVICES: u16 = 0x0010;
pub const PID_PROXIED_DEVICE_COUNT: u16 = 0x0011;
pub const PID_QUEUED_MESSAGE: u16 = 0x0020;

/// Status type requested when polling `QUEUED_MESSAGE` after an ACK_TIMER.
pub const STATUS_ERROR: u8 = 0x04;

/// Command class slot of a request or response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandClass {
	Discover = 0x10,
	DiscoverResponse = 0x11,
	Get = 0x20,
	GetResponse = 0x21,
	Set = 0x30,
	SetResponse = 0x31,
}

impl CommandClass {
	/// The response class paired with a request class, `None` for classes
	/// that already are responses.
	pub fn response(self) -> Option<CommandClass> {
		match self {
			CommandClass::Discover => Some(CommandClass::DiscoverResponse),
			CommandClass::Get => Some(CommandClass::GetResponse),
			CommandClass::Set => Some(CommandClass::SetResponse),
			_ => None,
		}
	}
}

/// Response type slot of a response packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ResponseType {
	Ack = 0x00,
	AckTimer = 0x01,
	Nack = 0x02,
	AckOverflow = 0x03,
}

bitflags! {
	/// Control field of a `DISC_MUTE` / `DISC_UN_MUTE` response.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct ControlField: u16 {
		const MANAGED_PROXY = 0x0001;
		const SUB_DEVICE = 0x0002;
		const BOOT_LOADER = 0x0004;
		const PROXIED_DEVICE = 0x0008;
	}
}

/// 48-bit RDM unique identifier: ESTA manufacturer code in the high 16 bits,
/// device id in the low 32.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u64);

impl Uid {
	/// Addresses every device on the bus.
	pub const BROADCAST: Uid = Uid(0xFFFF_FFFF_FFFF);
	/// Largest assignable UID, the upper bound of the discovery search.
	pub const MAX: Uid = Uid(0xFFFF_FFFF_FFFE);

	pub const fn new(raw: u64) -> Self {
		Self(raw & 0xFFFF_FFFF_FFFF)
	}

	/// Addresses every device of one manufacturer.
	pub const fn mfr_broadcast(mfr: u16) -> Self {
		Self(((mfr as u64) << 32) | 0xFFFF_FFFF)
	}

	pub const fn raw(self) -> u64 {
		self.0
	}

	pub const fn manufacturer(self) -> u16 {
		(self.0 >> 32) as u16
	}

	pub const fn device(self) -> u32 {
		self.0 as u32
	}

	pub const fn is_broadcast(self) -> bool {
		self.0 == Self::BROADCAST.0 || self.0 & 0xFFFF_FFFF == 0xFFFF_FFFF
	}

	pub fn from_bytes(bytes: &[u8; UID_LENGTH]) -> Self {
		let mut raw = 0u64;
		for byte in bytes {
			raw = raw << 8 | u64::from(*byte);
		}
		Self(raw)
	}

	pub fn to_bytes(self) -> [u8; UID_LENGTH] {
		let mut bytes = [0u8; UID_LENGTH];
		for (i, byte) in bytes.iter_mut().enumerate() {
			*byte = (self.0 >> (8 * (UID_LENGTH - 1 - i))) as u8;
		}
		bytes
	}
}

impl fmt::Display for Uid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:04x}:{:08x}", self.manufacturer(), self.device())
	}
}

impl fmt::Debug for Uid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Uid({self})")
	}
}

/// Derives the controller UID of a port from its transport description.
///
/// The hash is seeded with fixed keys so a port keeps its UID across
/// restarts. A device id of `0xFFFF` is remapped to keep the historic
/// reserved value free.
pub fn generate_uid(description: &str) -> Uid {
	let state = ahash::RandomState::with_seeds(
		0x243F_6A88_85A3_08D3,
		0x1319_8A2E_0370_7344,
		0xA409_3822_299F_31D0,
		0x082E_FA98_EC4E_6C89,
	);
	let mut device = state.hash_one(description) as u32;
	if device == 0xFFFF {
		device = 0xFFFE;
	}
	Uid((u64::from(ESTA_OPEN_LIGHTING) << 32) | u64::from(device))
}

/// Reads a big-endian UID from the first [`UID_LENGTH`] bytes of a slice.
pub(crate) fn read_uid(bytes: &[u8]) -> Uid {
	let mut raw = 0u64;
	for byte in &bytes[..UID_LENGTH] {
		raw = raw << 8 | u64::from(*byte);
	}
	Uid::new(raw)
}

/// 16-bit additive checksum over a byte stream, as transmitted in the last
/// two slots of every RDM frame.
pub fn checksum<'a, I>(bytes: I) -> u16
where
	I: IntoIterator<Item = &'a u8>,
{
	bytes
		.into_iter()
		.fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uid_round_trip() {
		for raw in [0u64, 1, 0x7A70_0000_0001, 0x1234_5678_9ABC, Uid::MAX.raw()] {
			let uid = Uid::new(raw);
			assert_eq!(Uid::from_bytes(&uid.to_bytes()), uid);
		}
	}

	#[test]
	fn uid_masks_to_48_bits() {
		assert_eq!(Uid::new(0xFFFF_7A70_0000_0001).raw(), 0x7A70_0000_0001);
	}

	#[test]
	fn uid_split() {
		let uid = Uid::new(0x7A70_AABB_CCDD);
		assert_eq!(uid.manufacturer(), 0x7A70);
		assert_eq!(uid.device(), 0xAABB_CCDD);
		assert_eq!(uid.to_string(), "7a70:aabbccdd");
	}

	#[test]
	fn broadcast_uids() {
		assert!(Uid::BROADCAST.is_broadcast());
		assert!(Uid::mfr_broadcast(0x7A70).is_broadcast());
		assert!(!Uid::MAX.is_broadcast());
		assert_eq!(Uid::mfr_broadcast(0x7A70).manufacturer(), 0x7A70);
	}

	#[test]
	fn generated_uid_is_stable_and_ours() {
		let a = generate_uid("s:0x0403:0x6001:00418TL8");
		let b = generate_uid("s:0x0403:0x6001:00418TL8");
		assert_eq!(a, b);
		assert_eq!(a.manufacturer(), ESTA_OPEN_LIGHTING);
		assert_ne!(a, generate_uid("s:0x0403:0x6001:00418TL9"));
	}

	#[test]
	fn checksum_is_additive_mod_2_16() {
		assert_eq!(checksum(&[0xFFu8, 0x02]), 0x0101);
		assert_eq!(checksum(&[]), 0);
	}

	#[test]
	fn command_class_pairs() {
		assert_eq!(
			CommandClass::Discover.response(),
			Some(CommandClass::DiscoverResponse)
		);
		assert_eq!(CommandClass::Get.response(), Some(CommandClass::GetResponse));
		assert_eq!(CommandClass::Set.response(), Some(CommandClass::SetResponse));
		assert_eq!(CommandClass::GetResponse.response(), None);
	}
}
