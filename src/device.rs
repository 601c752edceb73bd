//! The per-port RDM engine.
//!
//! A [`PortDevice`] drives one physical bus: it builds and sends requests
//! through the transactional send path, walks the 48-bit UID space with the
//! binary-tree discovery algorithm, expands proxies, and reconciles the
//! port's [`Inventory`] incrementally. One instance is owned by the port's
//! RDM worker; the transport handle is shared with the DMX worker and every
//! bus exchange takes the transport mutex for exactly one BREAK + data +
//! read sequence.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::config::{RDM_DEFAULT_RETRIES, RDM_DEFAULT_TIMEOUT, TRANSPORT_UNAVAILABLE_BACKOFF};
use crate::inventory::{self, Inventory};
use crate::rdm::packet::{Frame, RdmPacket};
use crate::rdm::{
	CommandClass, ControlField, PID_DISC_MUTE, PID_DISC_UN_MUTE, PID_DISC_UNIQUE_BRANCH,
	PID_PROXIED_DEVICE_COUNT, PID_PROXIED_DEVICES, PID_QUEUED_MESSAGE, RDM_RESPONSE_MAX,
	ResponseType, SC_RDM, STATUS_ERROR, UID_LENGTH, Uid, dub, generate_uid, read_uid,
};
use crate::transport::{Transport, TransportError};

/// A port's transport, shared between its two workers. The mutex scope is
/// one bus exchange; it is never held across retries or sleeps.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Responses accumulated by one transactional send (singular unless the
/// responder answered with ACK_OVERFLOW fragments).
pub type Responses = SmallVec<[RdmPacket; 1]>;

/// Outcome of a mute or unmute transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuteStatus {
	/// The device did not answer; it is not (or no longer) on the bus.
	NoResponse,
	/// The device acknowledged, reporting whether it manages proxied
	/// devices.
	Muted { is_proxy: bool },
}

pub struct PortDevice {
	transport: SharedTransport,
	uid: Uid,
	port_id: u8,
	transaction_number: u8,
	inventory: Inventory,
	discovery_in_progress: bool,
}

impl PortDevice {
	pub fn new(transport: SharedTransport, port_id: u8) -> Self {
		let uid = generate_uid(transport.lock().unwrap().description());
		info!("port {port_id}: controller uid {uid}");
		Self {
			transport,
			uid,
			port_id,
			transaction_number: 0,
			inventory: Inventory::new(),
			discovery_in_progress: false,
		}
	}

	pub fn uid(&self) -> Uid {
		self.uid
	}

	pub fn inventory(&self) -> &Inventory {
		&self.inventory
	}

	pub fn transport(&self) -> &SharedTransport {
		&self.transport
	}

	fn next_transaction_number(&mut self) -> u8 {
		let tn = self.transaction_number;
		self.transaction_number = tn.wrapping_add(1);
		tn
	}

	fn request(&mut self, dest: Uid, command_class: CommandClass, pid: u16, pdata: &[u8]) -> RdmPacket {
		let tn = self.next_transaction_number();
		RdmPacket::request(dest, self.uid, tn, self.port_id, 0, command_class, pid, pdata)
	}

	/// One exchange on the bus under the transport lock. `Unavailable`
	/// incurs the mandated backoff and aborts the caller; other I/O faults
	/// read as a silent bus.
	fn exchange(
		&self,
		frame: &Frame,
		expect_dub: bool,
		response: &mut [u8; RDM_RESPONSE_MAX],
	) -> Result<usize, TransportError> {
		let result = {
			let mut transport = self.transport.lock().unwrap();
			transport.write_rdm(&frame[1..], expect_dub, response)
		};
		match result {
			Ok(len) => Ok(len),
			Err(TransportError::Unavailable) => {
				warn!("port {}: usb device unavailable", self.port_id);
				thread::sleep(TRANSPORT_UNAVAILABLE_BACKOFF);
				Err(TransportError::Unavailable)
			}
			Err(TransportError::NotOpen) => Err(TransportError::NotOpen),
			Err(err) => {
				debug!("port {}: bus exchange failed: {err}", self.port_id);
				Ok(0)
			}
		}
	}

	/// Transactional send with the default retry and time budget.
	pub fn send_request(&mut self, pkt: RdmPacket) -> Responses {
		self.send_request_with(pkt, RDM_DEFAULT_RETRIES, RDM_DEFAULT_TIMEOUT)
	}

	/// Sends `pkt` and collects its response packets.
	///
	/// Every attempt after the first gets a fresh transaction number and
	/// counts against the elapsed-time budget. Responses are matched
	/// against the paired response command class and the *original* PID,
	/// so stray queued messages never satisfy a transaction. ACK_TIMER
	/// swaps the in-flight request to a `QUEUED_MESSAGE` poll for the rest
	/// of the call; ACK_OVERFLOW fragments accumulate until the final ACK.
	pub fn send_request_with(
		&mut self,
		mut pkt: RdmPacket,
		retries: u32,
		max_time: Duration,
	) -> Responses {
		let mut responses = Responses::new();
		let Some(expected_cc) = pkt.command_class.response() else {
			debug!("not a request command class: {:?}", pkt.command_class);
			return responses;
		};
		if pkt.dest.is_broadcast() {
			self.send_broadcast(&pkt);
			return responses;
		}

		let original_pid = pkt.pid;
		let controller = pkt.src;
		let start = Instant::now();
		let mut response_buf = [0u8; RDM_RESPONSE_MAX];

		for attempt in 0..=retries {
			if attempt != 0 {
				pkt.transaction_number = self.next_transaction_number();
				if start.elapsed() > max_time {
					break;
				}
			}

			let frame = pkt.encode();
			let Ok(len) = self.exchange(&frame, false, &mut response_buf) else {
				return Responses::new();
			};
			if len == 0 {
				continue;
			}

			let resp = match RdmPacket::decode(&response_buf[..len], controller) {
				Ok(resp) => resp,
				Err(err) => {
					trace!("discarding response: {err}");
					continue;
				}
			};
			if resp.command_class != expected_cc || resp.pid != original_pid {
				trace!(
					"discarding response with unexpected cc/pid {:?}/{:#06x}",
					resp.command_class, resp.pid
				);
				continue;
			}
			let Some(response_type) = resp.response_type() else {
				continue;
			};

			if expected_cc == CommandClass::DiscoverResponse {
				if response_type == ResponseType::Ack {
					responses.push(resp);
					break;
				}
				continue;
			}

			match response_type {
				ResponseType::Ack => {
					responses.push(resp);
					return responses;
				}
				ResponseType::AckOverflow => {
					trace!("ACK_OVERFLOW, collecting fragment {}", responses.len());
					responses.push(resp);
				}
				ResponseType::AckTimer => {
					if resp.pdata.len() != 2 {
						continue;
					}
					let wait = Duration::from_millis(
						100 * u64::from(u16::from_be_bytes([resp.pdata[0], resp.pdata[1]])),
					);
					debug!("ACK_TIMER, responder asks for {} ms", wait.as_millis());
					// Poll the responder's message queue from here on; the
					// deferred reply still carries the original PID.
					pkt.command_class = CommandClass::Get;
					pkt.pid = PID_QUEUED_MESSAGE;
					pkt.pdata.clear();
					pkt.pdata.extend([STATUS_ERROR]);
					let remaining = max_time.saturating_sub(start.elapsed());
					thread::sleep(wait.min(remaining));
				}
				ResponseType::Nack => {
					debug!("NACK for pid {original_pid:#06x} from {}", resp.src);
				}
			}
		}

		responses
	}

	/// Emits a broadcast request: exactly one send, no response expected.
	fn send_broadcast(&mut self, pkt: &RdmPacket) {
		let frame = pkt.encode();
		let mut sink = [0u8; RDM_RESPONSE_MAX];
		self.exchange(&frame, false, &mut sink).ok();
	}

	/// Relays a raw request body received from the network (sub-start code
	/// first, checksum included) and returns the response frames, start
	/// code included.
	pub fn relay_request(&mut self, body: &[u8]) -> SmallVec<[Frame; 1]> {
		let mut frame = Vec::with_capacity(body.len() + 1);
		frame.push(SC_RDM);
		frame.extend_from_slice(body);
		let pkt = match RdmPacket::decode_any(&frame) {
			Ok(pkt) => pkt,
			Err(err) => {
				debug!("dropping malformed relayed request: {err}");
				return SmallVec::new();
			}
		};
		if pkt.dest.is_broadcast() {
			self.send_broadcast(&pkt);
			return SmallVec::new();
		}
		self.send_request(pkt)
			.into_iter()
			.map(|resp| resp.encode())
			.collect()
	}

	/// Unmutes every device on the bus ahead of a discovery pass.
	fn send_unmute_all(&mut self) {
		let pkt = self.request(Uid::BROADCAST, CommandClass::Discover, PID_DISC_UN_MUTE, &[]);
		self.send_broadcast(&pkt);
	}

	/// Mutes (or unmutes) one device. The reply's optional control field
	/// carries the managed-proxy bit.
	fn send_mute(&mut self, uid: Uid, unmute: bool) -> MuteStatus {
		let pid = if unmute { PID_DISC_UN_MUTE } else { PID_DISC_MUTE };
		let pkt = self.request(uid, CommandClass::Discover, pid, &[]);
		let responses = self.send_request(pkt);
		let Some(resp) = responses.first() else {
			return MuteStatus::NoResponse;
		};
		if resp.src != uid {
			return MuteStatus::NoResponse;
		}
		let is_proxy = match resp.pdata.len() {
			// Control field alone, or control field plus binding UID.
			2 | 8 => ControlField::from_bits_retain(u16::from_be_bytes([
				resp.pdata[0],
				resp.pdata[1],
			]))
			.contains(ControlField::MANAGED_PROXY),
			_ => false,
		};
		MuteStatus::Muted { is_proxy }
	}

	/// Reads a proxy's list of represented devices, overflow fragments
	/// included.
	fn proxy_tod(&mut self, proxy: Uid) -> Vec<Uid> {
		let pkt = self.request(proxy, CommandClass::Get, PID_PROXIED_DEVICES, &[]);
		let mut tod = Vec::new();
		for resp in self.send_request(pkt) {
			if resp.pdata.len() > 0xE4 {
				continue;
			}
			for chunk in resp.pdata.chunks_exact(UID_LENGTH) {
				tod.push(read_uid(chunk));
			}
		}
		tod
	}

	/// Asks a proxy whether its device list changed since it was last read.
	fn has_proxy_tod_changed(&mut self, proxy: Uid) -> bool {
		let pkt = self.request(proxy, CommandClass::Get, PID_PROXIED_DEVICE_COUNT, &[]);
		let responses = self.send_request(pkt);
		let Some(resp) = responses.first() else {
			return false;
		};
		resp.pdata.len() == 3 && resp.pdata[2] != 0
	}

	/// Binary-tree search of `[lo, hi]` for unmuted devices.
	///
	/// A silent branch is empty; a branch answering with one valid DUB
	/// holds exactly one device, which is muted and (if a proxy) expanded;
	/// anything else is a collision and the branch is split in half.
	fn discover(&mut self, lo: u64, hi: u64) -> Vec<Uid> {
		let mut mute_uid = Uid::new(lo);
		if lo != hi {
			let mut pdata = [0u8; 2 * UID_LENGTH];
			pdata[..UID_LENGTH].copy_from_slice(&Uid::new(lo).to_bytes());
			pdata[UID_LENGTH..].copy_from_slice(&Uid::new(hi).to_bytes());
			let pkt = self.request(
				Uid::BROADCAST,
				CommandClass::Discover,
				PID_DISC_UNIQUE_BRANCH,
				&pdata,
			);
			let frame = pkt.encode();
			let mut response = [0u8; RDM_RESPONSE_MAX];
			let Ok(len) = self.exchange(&frame, true, &mut response) else {
				return Vec::new();
			};
			if len == 0 {
				return Vec::new();
			}
			match dub::decode(&response[..len]) {
				Ok(uid) => mute_uid = uid,
				Err(_) => {
					// Several devices answered at once.
					let mid = lo + (hi - lo + 1) / 2 - 1;
					let mut found = self.discover(lo, mid);
					for uid in self.discover(mid + 1, hi) {
						inventory::push_unique(&mut found, uid);
					}
					return found;
				}
			}
		}

		match self.send_mute(mute_uid, false) {
			// No mute response: the DUB reply was a phantom.
			MuteStatus::NoResponse => Vec::new(),
			MuteStatus::Muted { is_proxy } => {
				let mut found = vec![mute_uid];
				if is_proxy {
					for uid in self.proxy_tod(mute_uid) {
						inventory::push_unique(&mut found, uid);
					}
				}
				found
			}
		}
	}

	/// Full discovery: unmute the bus, search the whole UID space and
	/// replace the TOD with the result.
	pub fn full_discovery(&mut self) -> Vec<Uid> {
		if self.discovery_in_progress {
			return Vec::new();
		}
		self.discovery_in_progress = true;
		self.inventory.clear_history();

		self.send_unmute_all();
		let tod = self.discover(0, Uid::MAX.raw());
		for uid in &tod {
			info!("port {}: device discovered: {uid}", self.port_id);
		}
		self.inventory.set_tod(tod.clone());

		self.discovery_in_progress = false;
		tod
	}

	/// Incremental discovery: re-verify known devices, probe for lost ones
	/// coming back, search for new ones and reconcile the inventory.
	/// Returns the devices that appeared and those that went missing.
	pub fn incremental_discovery(&mut self) -> (Vec<Uid>, Vec<Uid>) {
		if self.discovery_in_progress {
			return (Vec::new(), Vec::new());
		}
		self.discovery_in_progress = true;

		let mut found = Vec::new();
		let mut new_lost = Vec::new();
		let mut new_proxies = Vec::new();

		self.send_unmute_all();

		// Re-mute everything we know about. A device that stays silent is
		// provisionally lost; proxy promotions and demotions are tracked.
		for uid in self.inventory.tod().to_vec() {
			match self.send_mute(uid, false) {
				MuteStatus::NoResponse => {
					new_lost.push(uid);
					self.inventory.unmark_proxy(uid);
				}
				MuteStatus::Muted { is_proxy } => {
					if self.inventory.is_proxy(uid) {
						if !is_proxy {
							self.inventory.unmark_proxy(uid);
						}
					} else if is_proxy {
						new_proxies.push(uid);
						self.inventory.mark_proxy(uid);
					}
				}
			}
		}

		// Devices lost earlier may have come back.
		for uid in self.inventory.lost().to_vec() {
			if let MuteStatus::Muted { is_proxy } = self.send_mute(uid, false) {
				found.push(uid);
				if is_proxy && !self.inventory.is_proxy(uid) {
					new_proxies.push(uid);
					self.inventory.mark_proxy(uid);
				}
			}
		}

		let mut discovered = self.discover(0, Uid::MAX.raw());

		for proxy in self.inventory.proxies().to_vec() {
			// A proxy promoted this cycle is read unconditionally.
			if !new_proxies.contains(&proxy) && !self.has_proxy_tod_changed(proxy) {
				continue;
			}
			for uid in self.proxy_tod(proxy) {
				inventory::push_unique(&mut discovered, uid);
			}
		}

		for uid in discovered {
			inventory::remove(&mut new_lost, uid);
			if !self.inventory.tod().contains(&uid) && !found.contains(&uid) {
				found.push(uid);
			}
		}

		self.inventory.apply_delta(&found, &new_lost);

		for uid in &new_lost {
			info!("port {}: device lost: {uid}", self.port_id);
		}
		for uid in &found {
			info!("port {}: device discovered: {uid}", self.port_id);
		}

		self.discovery_in_progress = false;
		(found, new_lost)
	}
}
