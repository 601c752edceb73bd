//! The RDM packet codec.
//!
//! [`RdmPacket`] is the abstracted wire format of an E1.20 message. Encoding
//! yields the full frame including the `0xCC` start code; the transport is
//! handed the frame *without* its first byte, since the BREAK sequence it
//! generates substitutes for the start code slot.

use thiserror::Error;

use crate::rdm::{
	CommandClass, RDM_FRAME_MAX, RDM_MAX_PDL, ResponseType, SC_RDM, SC_SUB_MESSAGE, Uid, checksum,
	read_uid,
};

/// Length-tagged parameter data of one packet.
pub type ParameterData = heapless::Vec<u8, RDM_MAX_PDL>;

/// One encoded frame, start code included.
pub type Frame = heapless::Vec<u8, RDM_FRAME_MAX>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
	#[error("frame too short ({0} bytes)")]
	Truncated(usize),
	#[error("bad start code {0:#04x}")]
	StartCode(u8),
	#[error("bad sub-start code {0:#04x}")]
	SubStartCode(u8),
	#[error("length slot {0} inconsistent with the received frame")]
	Length(u8),
	#[error("frame addressed to {0}")]
	Destination(Uid),
	#[error("checksum mismatch (expected {expected:#06x}, computed {computed:#06x})")]
	Checksum { expected: u16, computed: u16 },
	#[error("unknown command class {0:#04x}")]
	CommandClass(u8),
}

/// An RDM message, request or response.
///
/// `port_id_response_type` is the shared slot of E1.20 table 3-2: a port id
/// on requests, a [`ResponseType`] on responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdmPacket {
	pub dest: Uid,
	pub src: Uid,
	pub transaction_number: u8,
	pub port_id_response_type: u8,
	pub message_count: u8,
	pub sub_device: u16,
	pub command_class: CommandClass,
	pub pid: u16,
	pub pdata: ParameterData,
}

impl RdmPacket {
	/// Builds a controller request. Parameter data longer than
	/// [`RDM_MAX_PDL`] is truncated.
	#[allow(clippy::too_many_arguments)]
	pub fn request(
		dest: Uid,
		src: Uid,
		transaction_number: u8,
		port_id: u8,
		sub_device: u16,
		command_class: CommandClass,
		pid: u16,
		pdata: &[u8],
	) -> Self {
		let mut data = ParameterData::new();
		data.extend(pdata.iter().copied().take(RDM_MAX_PDL));
		Self {
			dest,
			src,
			transaction_number,
			port_id_response_type: port_id,
			message_count: 0,
			sub_device,
			command_class,
			pid,
			pdata: data,
		}
	}

	pub fn pdl(&self) -> u8 {
		self.pdata.len() as u8
	}

	/// The response-type reading of the shared slot.
	pub fn response_type(&self) -> Option<ResponseType> {
		ResponseType::try_from(self.port_id_response_type).ok()
	}

	/// Serializes the packet into a frame of `26 + pdl` bytes. The length
	/// slot is the slot number of the checksum-high byte.
	pub fn encode(&self) -> Frame {
		let mut frame = Frame::new();
		frame.extend([SC_RDM, SC_SUB_MESSAGE, 24 + self.pdl()]);
		frame.extend(self.dest.to_bytes());
		frame.extend(self.src.to_bytes());
		frame.extend([
			self.transaction_number,
			self.port_id_response_type,
			self.message_count,
		]);
		frame.extend(self.sub_device.to_be_bytes());
		frame.extend([self.command_class.into()]);
		frame.extend(self.pid.to_be_bytes());
		frame.extend([self.pdl()]);
		frame.extend(self.pdata.iter().copied());
		let sum = checksum(&frame);
		frame.extend(sum.to_be_bytes());
		frame
	}

	/// Decodes a response frame addressed to `controller`.
	///
	/// Frames destined elsewhere are rejected unless sent to the broadcast
	/// UID or to the broadcast UID of the controller's manufacturer.
	pub fn decode(frame: &[u8], controller: Uid) -> Result<Self, CodecError> {
		let packet = Self::decode_any(frame)?;
		if packet.dest != controller
			&& packet.dest != Uid::BROADCAST
			&& packet.dest != Uid::mfr_broadcast(controller.manufacturer())
		{
			return Err(CodecError::Destination(packet.dest));
		}
		Ok(packet)
	}

	/// Decodes a frame without filtering on the destination UID. Used for
	/// requests relayed from the network, which are destined to a fixture.
	pub fn decode_any(frame: &[u8]) -> Result<Self, CodecError> {
		if frame.len() < 26 {
			return Err(CodecError::Truncated(frame.len()));
		}
		if frame[0] != SC_RDM {
			return Err(CodecError::StartCode(frame[0]));
		}
		if frame[1] != SC_SUB_MESSAGE {
			return Err(CodecError::SubStartCode(frame[1]));
		}
		let length = usize::from(frame[2]);
		if length < 24 || length + 2 > frame.len() {
			return Err(CodecError::Length(frame[2]));
		}
		// Trailing bytes beyond the length slot (line noise after the
		// response) are not part of the message.
		let frame = &frame[..length + 2];

		let expected = u16::from_be_bytes([frame[length], frame[length + 1]]);
		let computed = checksum(&frame[..length]);
		if computed != expected {
			return Err(CodecError::Checksum { expected, computed });
		}

		let command_class = CommandClass::try_from(frame[20])
			.map_err(|_| CodecError::CommandClass(frame[20]))?;

		let pdl = usize::from(frame[23]);
		let mut pdata = ParameterData::new();
		pdata.extend(
			frame[24..]
				.iter()
				.copied()
				.take(pdl.min(RDM_MAX_PDL).min(length - 24)),
		);

		Ok(Self {
			dest: read_uid(&frame[3..9]),
			src: read_uid(&frame[9..15]),
			transaction_number: frame[15],
			port_id_response_type: frame[16],
			message_count: frame[17],
			sub_device: u16::from_be_bytes([frame[18], frame[19]]),
			command_class,
			pid: u16::from_be_bytes([frame[21], frame[22]]),
			pdata,
		})
	}
}
