//! The seam to the USB-serial transmitter driver.
//!
//! A [`Transport`] is one OpenRDM widget: a serial link at 250 kbaud, 8N2,
//! that frames outgoing DMX and RDM slots with BREAK/MAB and performs the
//! half-duplex turnaround read for RDM responses. Implementations live
//! outside this crate (FTDI, mock buses); the engine only relies on the
//! contract below.

use thiserror::Error;

pub use crate::rdm::RDM_RESPONSE_MAX;

#[derive(Debug, Error)]
pub enum TransportError {
	/// The USB device dropped off the bus (the driver's distinguished
	/// fatal error). Callers back off at least one second before touching
	/// the transport again.
	#[error("USB device unavailable")]
	Unavailable,
	/// The transport has not been opened, or a previous fault closed it.
	#[error("transport is not open")]
	NotOpen,
	/// Any other serial I/O failure. Treated as transient: an RDM request
	/// sees it as "no response", a DMX write skips the frame.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// One physical DMX512/RDM output.
///
/// All calls are synchronous and blocking; the per-port workers serialize
/// access so a BREAK + data + response-read sequence is never interleaved.
pub trait Transport: Send {
	/// Opens the serial link (250000 baud, 8 data bits, 2 stop bits, no
	/// parity, no flow control), purges both FIFOs and arms the 50 ms
	/// read/write timeouts.
	fn open(&mut self) -> Result<(), TransportError>;

	fn is_open(&self) -> bool;

	/// Sends one DMX universe frame: BREAK, MAB, null start code, `frame`.
	fn write_dmx(&mut self, frame: &[u8]) -> Result<(), TransportError>;

	/// Sends one RDM request and reads the bus until the response timeout.
	///
	/// `request` is the encoded frame without its start code slot; the
	/// BREAK toggling reproduces it on the wire. `expect_dub` suppresses
	/// BREAK framing on the read side, since DUB replies arrive raw.
	/// Returns the number of response bytes placed into `response`; `0`
	/// means the bus stayed silent.
	fn write_rdm(
		&mut self,
		request: &[u8],
		expect_dub: bool,
		response: &mut [u8; RDM_RESPONSE_MAX],
	) -> Result<usize, TransportError>;

	fn close(&mut self);

	/// The descriptor string the link was opened from, e.g.
	/// `s:0x0403:0x6001:00418TL8`. Stable for the lifetime of the port and
	/// unique per widget; the controller UID is derived from it.
	fn description(&self) -> &str;
}
