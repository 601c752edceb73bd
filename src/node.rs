//! The bridge node: a set of ports, their worker threads and the seam to
//! the ArtNet library.
//!
//! Each port runs two threads. The DMX worker drains a coalescing
//! single-frame slot and keeps the bus refreshed at a bounded cadence; the
//! RDM worker drains a FIFO of commands (relayed requests and discovery
//! triggers) and owns the port's [`PortDevice`], so inventory mutations and
//! upstream publications happen on one thread only. The ArtNet side calls
//! [`Node::dmx_ready`], [`Node::rdm_request`] and [`Node::rdm_initiate`]
//! from its own read loop; the handoff is a mutex-guarded queue plus a
//! counting semaphore per direction.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;

use crate::config::{
	DMX_CHANNELS, DMX_REFRESH_INTERVAL, RDM_INCREMENTAL_SCAN_INTERVAL, RDM_QUEUE_WAIT,
	TRANSPORT_REINIT_BACKOFF, TRANSPORT_UNAVAILABLE_BACKOFF,
};
use crate::device::{PortDevice, SharedTransport};
use crate::rdm::{SC_RDM, SC_SUB_MESSAGE, Uid};
use crate::synch::semaphore::Semaphore;
use crate::transport::{Transport, TransportError};

/// Index of a port within its node.
pub type PortId = usize;

/// The operations the node invokes on the ArtNet library.
pub trait ArtnetAdapter: Send + Sync + 'static {
	/// Publishes newly discovered devices into the port's table of devices.
	fn publish_rdm_devices(&self, port: PortId, uids: &[Uid]);

	/// Removes one device from the port's table of devices.
	fn remove_rdm_device(&self, port: PortId, uid: Uid);

	/// Sends an RDM response (sub-start code first) to the controller of
	/// `universe`.
	fn send_rdm(&self, universe: u8, data: &[u8]);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NodeConfig {
	/// Periodically reconcile each port's inventory in the background.
	pub incremental_scan: bool,
}

#[derive(Debug, Error)]
pub enum NodeError {
	#[error("transport descriptor {0:?} is used by more than one port")]
	DuplicateDevice(String),
	#[error("node workers are already running")]
	AlreadyStarted,
	#[error("failed to spawn worker thread")]
	Spawn(#[from] std::io::Error),
}

/// One unit of work for an RDM worker.
enum RdmCommand {
	/// A raw request body relayed from the network.
	Request { universe: u8, data: Vec<u8> },
	/// Run a full discovery pass and publish the TOD.
	FullDiscovery,
}

/// The coalescing DMX handoff slot: callbacks overwrite it, the worker
/// always emits the most recent frame.
struct DmxSlot {
	changed: bool,
	length: usize,
	data: [u8; DMX_CHANNELS],
}

struct PortShared {
	dmx: Mutex<DmxSlot>,
	rdm_queue: Mutex<VecDeque<RdmCommand>>,
	dmx_sema: Semaphore,
	rdm_sema: Semaphore,
}

impl PortShared {
	fn new() -> Self {
		Self {
			dmx: Mutex::new(DmxSlot {
				changed: false,
				length: 0,
				data: [0; DMX_CHANNELS],
			}),
			rdm_queue: Mutex::new(VecDeque::new()),
			dmx_sema: Semaphore::new(0),
			rdm_sema: Semaphore::new(0),
		}
	}
}

struct Port {
	universe: u8,
	/// Gates the relayed-request path only; discovery and DMX run either way.
	rdm_enabled: bool,
	description: String,
	shared: Arc<PortShared>,
	transport: SharedTransport,
	/// Taken by the RDM worker when the node starts.
	device: Mutex<Option<PortDevice>>,
}

pub struct Node<A: ArtnetAdapter> {
	artnet: Arc<A>,
	config: NodeConfig,
	ports: Vec<Port>,
	thread_exit: Arc<AtomicBool>,
	started: AtomicBool,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: ArtnetAdapter> Node<A> {
	pub fn new(artnet: A, config: NodeConfig) -> Self {
		Self {
			artnet: Arc::new(artnet),
			config,
			ports: Vec::new(),
			thread_exit: Arc::new(AtomicBool::new(false)),
			started: AtomicBool::new(false),
			workers: Mutex::new(Vec::new()),
		}
	}

	/// Registers a transport as the output for `universe`. `rdm_enabled`
	/// decides whether the port terminates relayed RDM requests.
	///
	/// The transport is opened eagerly; failure is not fatal since the
	/// workers re-initialize a closed transport. Two ports on one widget
	/// would interleave BREAK sequences, so duplicate descriptors are
	/// rejected.
	pub fn add_port(
		&mut self,
		mut transport: Box<dyn Transport>,
		universe: u8,
		rdm_enabled: bool,
	) -> Result<PortId, NodeError> {
		let description = transport.description().to_string();
		if self.ports.iter().any(|port| port.description == description) {
			return Err(NodeError::DuplicateDevice(description));
		}

		let port = self.ports.len();
		if let Err(err) = transport.open() {
			warn!("port {port}: open failed: {err}");
		}
		let transport: SharedTransport = Arc::new(Mutex::new(transport));
		let device = PortDevice::new(Arc::clone(&transport), port as u8 + 1);
		self.ports.push(Port {
			universe,
			rdm_enabled,
			description,
			shared: Arc::new(PortShared::new()),
			transport,
			device: Mutex::new(Some(device)),
		});
		Ok(port)
	}

	pub fn ports(&self) -> usize {
		self.ports.len()
	}

	/// Spawns the two workers of every port.
	pub fn start(&self) -> Result<(), NodeError> {
		if self.started.swap(true, Ordering::SeqCst) {
			return Err(NodeError::AlreadyStarted);
		}

		let mut workers = self.workers.lock().unwrap();
		for (index, port) in self.ports.iter().enumerate() {
			let Some(device) = port.device.lock().unwrap().take() else {
				continue;
			};

			let shared = Arc::clone(&port.shared);
			let transport = Arc::clone(&port.transport);
			let exit = Arc::clone(&self.thread_exit);
			workers.push(
				thread::Builder::new()
					.name(format!("dmx-{index}"))
					.spawn(move || dmx_worker(&shared, &transport, index, &exit))?,
			);

			let shared = Arc::clone(&port.shared);
			let artnet = Arc::clone(&self.artnet);
			let exit = Arc::clone(&self.thread_exit);
			let incremental_scan = self.config.incremental_scan;
			let rdm_enabled = port.rdm_enabled;
			workers.push(
				thread::Builder::new()
					.name(format!("rdm-{index}"))
					.spawn(move || {
						rdm_worker(
							&shared,
							device,
							&*artnet,
							index,
							rdm_enabled,
							incremental_scan,
							&exit,
						);
					})?,
			);
		}
		Ok(())
	}

	/// Signals all workers to exit, joins them and closes the transports.
	pub fn shutdown(&self) {
		self.thread_exit.store(true, Ordering::SeqCst);
		// Wake both workers of every port out of their timed waits.
		for port in &self.ports {
			port.shared.dmx_sema.release();
			port.shared.rdm_sema.release();
		}
		let workers = std::mem::take(&mut *self.workers.lock().unwrap());
		for worker in workers {
			worker.join().ok();
		}
		for port in &self.ports {
			port.transport.lock().unwrap().close();
		}
	}

	/// ArtNet callback: a fresh DMX frame for `port` is ready.
	pub fn dmx_ready(&self, port: PortId, frame: &[u8]) {
		let Some(port) = self.ports.get(port) else {
			return;
		};
		let length = frame.len().min(DMX_CHANNELS);
		{
			let mut slot = port.shared.dmx.lock().unwrap();
			slot.data[..length].copy_from_slice(&frame[..length]);
			slot.length = length;
			slot.changed = true;
		}
		port.shared.dmx_sema.release();
	}

	/// ArtNet callback: an RDM request arrived for `universe`. Every
	/// RDM-enabled port bound to that address relays its own copy.
	pub fn rdm_request(&self, universe: u8, data: &[u8]) {
		if data.is_empty() {
			return;
		}
		debug!("rdm request for universe {universe}, {} bytes", data.len());
		for port in self
			.ports
			.iter()
			.filter(|port| port.universe == universe && port.rdm_enabled)
		{
			{
				let mut queue = port.shared.rdm_queue.lock().unwrap();
				queue.push_back(RdmCommand::Request {
					universe,
					data: data.to_vec(),
				});
			}
			port.shared.rdm_sema.release();
		}
	}

	/// ArtNet callback: the controller requested a full discovery on `port`.
	pub fn rdm_initiate(&self, port: PortId) {
		let Some(port) = self.ports.get(port) else {
			return;
		};
		{
			let mut queue = port.shared.rdm_queue.lock().unwrap();
			queue.push_back(RdmCommand::FullDiscovery);
		}
		port.shared.rdm_sema.release();
	}
}

impl<A: ArtnetAdapter> Drop for Node<A> {
	fn drop(&mut self) {
		if self.started.load(Ordering::SeqCst) {
			self.shutdown();
		}
	}
}

fn write_dmx_frame(transport: &SharedTransport, port: PortId, frame: &[u8]) {
	let result = transport.lock().unwrap().write_dmx(frame);
	match result {
		Ok(()) => {}
		Err(TransportError::Unavailable) => {
			warn!("port {port}: usb device unavailable");
			thread::sleep(TRANSPORT_UNAVAILABLE_BACKOFF);
		}
		Err(err) => debug!("port {port}: dmx write failed: {err}"),
	}
}

/// Drains the DMX slot and keeps the universe refreshed: a changed frame is
/// written immediately, and whenever [`DMX_REFRESH_INTERVAL`] passes without
/// a write the last frame is re-sent so receivers stay in sync.
fn dmx_worker(
	shared: &PortShared,
	transport: &SharedTransport,
	port: PortId,
	exit: &AtomicBool,
) {
	let mut frame = [0u8; DMX_CHANNELS];
	let mut length = 0usize;
	let mut last_write = Instant::now();

	while !exit.load(Ordering::Relaxed) {
		let signaled = shared.dmx_sema.acquire_timeout(DMX_REFRESH_INTERVAL);

		if !transport.lock().unwrap().is_open() {
			warn!("port {port}: transport not open");
			if exit.load(Ordering::Relaxed) {
				break;
			}
			thread::sleep(TRANSPORT_REINIT_BACKOFF);
			if exit.load(Ordering::Relaxed) {
				break;
			}
			if let Err(err) = transport.lock().unwrap().open() {
				warn!("port {port}: reopen failed: {err}");
			}
			continue;
		}

		if signaled {
			let mut fresh = false;
			{
				let mut slot = shared.dmx.lock().unwrap();
				if slot.changed {
					length = slot.length;
					frame[..length].copy_from_slice(&slot.data[..length]);
					slot.changed = false;
					fresh = true;
				}
			}
			if fresh {
				write_dmx_frame(transport, port, &frame[..length]);
				last_write = Instant::now();
			}
		}

		if (!signaled || last_write.elapsed() > DMX_REFRESH_INTERVAL) && length > 0 {
			write_dmx_frame(transport, port, &frame[..length]);
			last_write = Instant::now();
		}
	}
}

/// Drains the RDM command queue one entry at a time and runs the periodic
/// incremental scan. Everything that touches the inventory or publishes
/// upstream happens here.
fn rdm_worker<A: ArtnetAdapter>(
	shared: &PortShared,
	mut device: PortDevice,
	artnet: &A,
	port: PortId,
	rdm_enabled: bool,
	incremental_scan: bool,
	exit: &AtomicBool,
) {
	let mut last_scan = Instant::now();

	while !exit.load(Ordering::Relaxed) {
		let signaled = shared.rdm_sema.acquire_timeout(RDM_QUEUE_WAIT);

		if !device.transport().lock().unwrap().is_open() {
			// The DMX worker performs the reopen; skip bus work meanwhile.
			if exit.load(Ordering::Relaxed) {
				break;
			}
			thread::sleep(TRANSPORT_REINIT_BACKOFF);
			continue;
		}

		if signaled {
			let command = shared.rdm_queue.lock().unwrap().pop_front();
			match command {
				Some(RdmCommand::Request { universe, data }) => {
					relay(&mut device, artnet, universe, &data);
				}
				Some(RdmCommand::FullDiscovery) => {
					if rdm_enabled {
						info!("port {port}: starting full discovery");
					}
					let tod = device.full_discovery();
					if !tod.is_empty() {
						artnet.publish_rdm_devices(port, &tod);
					}
					last_scan = Instant::now();
				}
				None => {}
			}
		}

		if incremental_scan && last_scan.elapsed() > RDM_INCREMENTAL_SCAN_INTERVAL {
			if rdm_enabled {
				info!("port {port}: starting incremental discovery");
			}
			let (found, lost) = device.incremental_discovery();
			if !found.is_empty() {
				artnet.publish_rdm_devices(port, &found);
			}
			for uid in lost {
				artnet.remove_rdm_device(port, uid);
			}
			last_scan = Instant::now();
		}
	}
}

fn relay<A: ArtnetAdapter>(device: &mut PortDevice, artnet: &A, universe: u8, data: &[u8]) {
	// The body announces its own length; trim network padding behind it.
	let mut length = data.len();
	if length > 2 && data[0] == SC_SUB_MESSAGE {
		length = length.min(1 + usize::from(data[1]));
	}
	for frame in device.relay_request(&data[..length]) {
		// The start code slot is not part of an ArtNet RDM payload.
		debug_assert_eq!(frame[0], SC_RDM);
		artnet.send_rdm(universe, &frame[1..]);
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::rdm::packet::RdmPacket;
	use crate::rdm::{
		CommandClass, PID_DISC_MUTE, PID_DISC_UN_MUTE, PID_DISC_UNIQUE_BRANCH, RDM_RESPONSE_MAX,
		ResponseType, dub,
	};

	#[derive(Default)]
	struct AdapterState {
		published: Mutex<Vec<(PortId, Vec<Uid>)>>,
		removed: Mutex<Vec<(PortId, Uid)>>,
		sent: Mutex<Vec<(u8, Vec<u8>)>>,
	}

	#[derive(Clone, Default)]
	struct RecordingAdapter(Arc<AdapterState>);

	impl ArtnetAdapter for RecordingAdapter {
		fn publish_rdm_devices(&self, port: PortId, uids: &[Uid]) {
			self.0.published.lock().unwrap().push((port, uids.to_vec()));
		}

		fn remove_rdm_device(&self, port: PortId, uid: Uid) {
			self.0.removed.lock().unwrap().push((port, uid));
		}

		fn send_rdm(&self, universe: u8, data: &[u8]) {
			self.0.sent.lock().unwrap().push((universe, data.to_vec()));
		}
	}

	#[derive(Default)]
	struct MiniBusState {
		muted: bool,
		dmx_frames: Vec<Vec<u8>>,
		dmx_instants: Vec<Instant>,
		rdm_writes: usize,
	}

	/// A transport with exactly one responding fixture behind it.
	struct MiniBus {
		uid: Uid,
		description: String,
		state: Arc<Mutex<MiniBusState>>,
	}

	impl MiniBus {
		fn new(uid: u64, description: &str) -> (Self, Arc<Mutex<MiniBusState>>) {
			let state = Arc::new(Mutex::new(MiniBusState::default()));
			let bus = Self {
				uid: Uid::new(uid),
				description: description.to_string(),
				state: Arc::clone(&state),
			};
			(bus, state)
		}

		fn reply(&self, request: &RdmPacket, response_type: ResponseType, pdata: &[u8]) -> Vec<u8> {
			let mut pkt = RdmPacket::request(
				request.src,
				self.uid,
				request.transaction_number,
				0,
				0,
				request.command_class.response().unwrap(),
				request.pid,
				pdata,
			);
			pkt.port_id_response_type = response_type.into();
			pkt.encode().to_vec()
		}
	}

	impl Transport for MiniBus {
		fn open(&mut self) -> Result<(), TransportError> {
			Ok(())
		}

		fn is_open(&self) -> bool {
			true
		}

		fn write_dmx(&mut self, frame: &[u8]) -> Result<(), TransportError> {
			let mut state = self.state.lock().unwrap();
			state.dmx_frames.push(frame.to_vec());
			state.dmx_instants.push(Instant::now());
			Ok(())
		}

		fn write_rdm(
			&mut self,
			request: &[u8],
			_expect_dub: bool,
			response: &mut [u8; RDM_RESPONSE_MAX],
		) -> Result<usize, TransportError> {
			let mut state = self.state.lock().unwrap();
			state.rdm_writes += 1;

			let mut frame = vec![SC_RDM];
			frame.extend_from_slice(request);
			let Ok(pkt) = RdmPacket::decode_any(&frame) else {
				return Ok(0);
			};

			let reply: Option<Vec<u8>> = match (pkt.command_class, pkt.pid) {
				(CommandClass::Discover, PID_DISC_UNIQUE_BRANCH) => {
					if state.muted {
						None
					} else {
						Some(dub::encode(self.uid, 0).to_vec())
					}
				}
				(CommandClass::Discover, PID_DISC_MUTE) => {
					if pkt.dest == self.uid {
						state.muted = true;
						Some(self.reply(&pkt, ResponseType::Ack, &[0x00, 0x00]))
					} else {
						if pkt.dest.is_broadcast() {
							state.muted = true;
						}
						None
					}
				}
				(CommandClass::Discover, PID_DISC_UN_MUTE) => {
					if pkt.dest.is_broadcast() || pkt.dest == self.uid {
						state.muted = false;
					}
					(pkt.dest == self.uid)
						.then(|| self.reply(&pkt, ResponseType::Ack, &[0x00, 0x00]))
				}
				(CommandClass::Get, _) => (pkt.dest == self.uid)
					.then(|| self.reply(&pkt, ResponseType::Ack, &[0xAB])),
				_ => None,
			};

			match reply {
				Some(bytes) => {
					response[..bytes.len()].copy_from_slice(&bytes);
					Ok(bytes.len())
				}
				None => Ok(0),
			}
		}

		fn close(&mut self) {}

		fn description(&self) -> &str {
			&self.description
		}
	}

	fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
		let start = Instant::now();
		while start.elapsed() < timeout {
			if done() {
				return true;
			}
			thread::sleep(Duration::from_millis(10));
		}
		done()
	}

	#[test]
	fn duplicate_descriptors_are_rejected() {
		let mut node = Node::new(RecordingAdapter::default(), NodeConfig::default());
		let (bus_a, _) = MiniBus::new(0x10, "s:0x0403:0x6001:A");
		let (bus_b, _) = MiniBus::new(0x11, "s:0x0403:0x6001:A");
		node.add_port(Box::new(bus_a), 0, true).unwrap();
		let err = node.add_port(Box::new(bus_b), 1, true).unwrap_err();
		assert!(matches!(err, NodeError::DuplicateDevice(_)));
	}

	#[test]
	fn starting_twice_fails() {
		let node = Node::new(RecordingAdapter::default(), NodeConfig::default());
		node.start().unwrap();
		assert!(matches!(node.start(), Err(NodeError::AlreadyStarted)));
		node.shutdown();
	}

	#[test]
	fn dmx_worker_refreshes_at_the_configured_cadence() {
		let adapter = RecordingAdapter::default();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus, state) = MiniBus::new(0x10, "dmx-cadence");
		node.add_port(Box::new(bus), 0, false).unwrap();
		node.start().unwrap();

		node.dmx_ready(0, &[1, 2, 3]);
		thread::sleep(Duration::from_millis(300));
		node.shutdown();

		let state = state.lock().unwrap();
		// One immediate write plus a refresh roughly every 50 ms.
		assert!(
			(4..=9).contains(&state.dmx_frames.len()),
			"{} dmx writes in 300 ms",
			state.dmx_frames.len()
		);
		for frame in &state.dmx_frames {
			assert_eq!(frame.as_slice(), &[1, 2, 3]);
		}
		for pair in state.dmx_instants.windows(2) {
			assert!(pair[1] - pair[0] >= Duration::from_millis(30));
		}
	}

	#[test]
	fn no_dmx_is_emitted_before_the_first_frame() {
		let mut node = Node::new(RecordingAdapter::default(), NodeConfig::default());
		let (bus, state) = MiniBus::new(0x10, "dmx-idle");
		node.add_port(Box::new(bus), 0, false).unwrap();
		node.start().unwrap();
		thread::sleep(Duration::from_millis(120));
		node.shutdown();
		assert!(state.lock().unwrap().dmx_frames.is_empty());
	}

	#[test]
	fn full_discovery_publishes_the_tod() {
		let adapter = RecordingAdapter::default();
		let recorder = adapter.clone();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus, _) = MiniBus::new(0x7A70_0000_0042, "disc");
		node.add_port(Box::new(bus), 0, true).unwrap();
		node.start().unwrap();

		node.rdm_initiate(0);
		assert!(wait_until(Duration::from_secs(5), || {
			!recorder.0.published.lock().unwrap().is_empty()
		}));
		node.shutdown();

		let published = recorder.0.published.lock().unwrap();
		assert_eq!(published.len(), 1);
		assert_eq!(published[0], (0, vec![Uid::new(0x7A70_0000_0042)]));
	}

	#[test]
	fn relayed_request_response_reaches_the_controller() {
		let adapter = RecordingAdapter::default();
		let recorder = adapter.clone();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus, _) = MiniBus::new(0x7A70_0000_0042, "relay");
		node.add_port(Box::new(bus), 3, true).unwrap();
		node.start().unwrap();

		let request = RdmPacket::request(
			Uid::new(0x7A70_0000_0042),
			Uid::new(0x7A70_0000_9999),
			1,
			1,
			0,
			CommandClass::Get,
			0x0082,
			&[],
		);
		node.rdm_request(3, &request.encode()[1..]);
		assert!(wait_until(Duration::from_secs(5), || {
			!recorder.0.sent.lock().unwrap().is_empty()
		}));
		node.shutdown();

		let sent = recorder.0.sent.lock().unwrap();
		assert_eq!(sent.len(), 1);
		let (universe, body) = &sent[0];
		assert_eq!(*universe, 3);
		// The forwarded body carries no start code; re-frame and decode.
		let mut frame = vec![SC_RDM];
		frame.extend_from_slice(body);
		let resp = RdmPacket::decode(&frame, Uid::new(0x7A70_0000_9999)).unwrap();
		assert_eq!(resp.pdata.as_slice(), &[0xAB]);
	}

	#[test]
	fn every_port_on_a_universe_relays_the_request() {
		let adapter = RecordingAdapter::default();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus_a, state_a) = MiniBus::new(0x20, "multi-a");
		let (bus_b, state_b) = MiniBus::new(0x21, "multi-b");
		node.add_port(Box::new(bus_a), 7, true).unwrap();
		node.add_port(Box::new(bus_b), 7, true).unwrap();
		node.start().unwrap();

		let request = RdmPacket::request(
			Uid::new(0x99),
			Uid::new(0x7A70_0000_9999),
			1,
			1,
			0,
			CommandClass::Set,
			0x1000,
			&[0x01],
		);
		node.rdm_request(7, &request.encode()[1..]);
		assert!(wait_until(Duration::from_secs(5), || {
			state_a.lock().unwrap().rdm_writes > 0 && state_b.lock().unwrap().rdm_writes > 0
		}));
		node.shutdown();
	}

	#[test]
	fn disabled_port_ignores_relayed_requests() {
		let adapter = RecordingAdapter::default();
		let recorder = adapter.clone();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus_on, state_on) = MiniBus::new(0x20, "gate-on");
		let (bus_off, state_off) = MiniBus::new(0x21, "gate-off");
		node.add_port(Box::new(bus_on), 7, true).unwrap();
		node.add_port(Box::new(bus_off), 7, false).unwrap();
		node.start().unwrap();

		let request = RdmPacket::request(
			Uid::new(0x20),
			Uid::new(0x7A70_0000_9999),
			1,
			1,
			0,
			CommandClass::Get,
			0x0082,
			&[],
		);
		node.rdm_request(7, &request.encode()[1..]);
		assert!(wait_until(Duration::from_secs(5), || {
			!recorder.0.sent.lock().unwrap().is_empty()
		}));
		node.shutdown();

		// Only the enabled port put the request on its bus.
		assert!(state_on.lock().unwrap().rdm_writes > 0);
		assert_eq!(state_off.lock().unwrap().rdm_writes, 0);
	}

	#[test]
	fn discovery_runs_on_an_rdm_disabled_port() {
		let adapter = RecordingAdapter::default();
		let recorder = adapter.clone();
		let mut node = Node::new(adapter, NodeConfig::default());
		let (bus, _) = MiniBus::new(0x7A70_0000_0042, "disc-off");
		node.add_port(Box::new(bus), 0, false).unwrap();
		node.start().unwrap();

		node.rdm_initiate(0);
		assert!(wait_until(Duration::from_secs(5), || {
			!recorder.0.published.lock().unwrap().is_empty()
		}));
		node.shutdown();

		let published = recorder.0.published.lock().unwrap();
		assert_eq!(published[0], (0, vec![Uid::new(0x7A70_0000_0042)]));
	}
}
