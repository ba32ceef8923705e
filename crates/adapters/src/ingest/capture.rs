use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, NetworkInterface};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use application::evaluator::Evaluator;
use domain::common::entity::Origin;
use ports::secondary::ingest_source::IngestSource;

/// Queue between the per-interface capture threads and the async
/// forwarder. Overflow drops frames; capture must never block.
const FRAME_CHANNEL_CAPACITY: usize = 1024;

/// Capture read timeout. Bounds how long a capture thread can outlive
/// its cancellation token.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

/// Live traffic ingest: captures frames on every up, non-loopback
/// interface and feeds (src, dst) pairs to the evaluator with an
/// `interface` origin naming the capturing interface.
pub struct InterfaceCapture {
    evaluator: Arc<Evaluator>,
}

impl InterfaceCapture {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator }
    }
}

/// Container/bridge virtual interfaces: docker0, br-*, veth*. Frames on
/// these are the same traffic already seen on the physical uplink, so
/// capturing them would double-count every bridged flow.
fn is_container_interface(name: &str) -> bool {
    name.starts_with("docker") || name.starts_with("br-") || name.starts_with("veth")
}

fn capturable(iface: &NetworkInterface) -> bool {
    iface.is_up() && !iface.is_loopback() && !is_container_interface(&iface.name)
}

/// Pull src/dst addresses out of a raw Ethernet frame. Non-IP frames
/// (ARP, LLDP, …) return `None`.
fn parse_frame(frame: &[u8]) -> Option<(String, String)> {
    if frame.len() < 14 {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);

    match ethertype {
        ETHERTYPE_IPV4 => {
            if frame.len() < 34 {
                return None;
            }
            let src = Ipv4Addr::new(frame[26], frame[27], frame[28], frame[29]);
            let dst = Ipv4Addr::new(frame[30], frame[31], frame[32], frame[33]);
            Some((src.to_string(), dst.to_string()))
        }
        ETHERTYPE_IPV6 => {
            if frame.len() < 54 {
                return None;
            }
            let src_bytes: [u8; 16] = frame[22..38].try_into().ok()?;
            let dst_bytes: [u8; 16] = frame[38..54].try_into().ok()?;
            let src = Ipv6Addr::from(src_bytes);
            let dst = Ipv6Addr::from(dst_bytes);
            Some((src.to_string(), dst.to_string()))
        }
        _ => None,
    }
}

/// Blocking capture loop for one interface. Exits when the token fires;
/// the read timeout guarantees the cancellation check runs at least once
/// a second even on a silent link.
fn capture_loop(
    iface: NetworkInterface,
    tx: mpsc::Sender<(String, String, String)>,
    shutdown: CancellationToken,
) {
    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Config::default()
    };

    let (_sender, mut receiver) = match datalink::channel(&iface, config) {
        Ok(Channel::Ethernet(sender, receiver)) => (sender, receiver),
        Ok(_) => {
            tracing::warn!(interface = %iface.name, "unsupported channel type, skipping");
            return;
        }
        Err(e) => {
            // Usually missing CAP_NET_RAW; the sensor keeps running on
            // whatever interfaces it could open.
            tracing::warn!(interface = %iface.name, error = %e, "failed to open capture");
            return;
        }
    };

    tracing::info!(interface = %iface.name, "capture started");

    while !shutdown.is_cancelled() {
        match receiver.next() {
            Ok(frame) => {
                if let Some((src, dst)) = parse_frame(frame) {
                    // Overflow means evaluation is the bottleneck;
                    // dropping frames here is the bounded behaviour.
                    let _ = tx.try_send((src, dst, iface.name.clone()));
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                tracing::warn!(interface = %iface.name, error = %e, "capture read error");
            }
        }
    }

    tracing::info!(interface = %iface.name, "capture stopped");
}

impl IngestSource for InterfaceCapture {
    fn name(&self) -> &'static str {
        "traffic"
    }

    fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let interfaces: Vec<NetworkInterface> = datalink::interfaces()
                .into_iter()
                .filter(capturable)
                .collect();

            if interfaces.is_empty() {
                tracing::warn!("no capturable interfaces found");
                return;
            }

            let (tx, mut rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
            let mut workers = Vec::with_capacity(interfaces.len());
            for iface in interfaces {
                let tx = tx.clone();
                let token = shutdown.clone();
                workers.push(tokio::task::spawn_blocking(move || {
                    capture_loop(iface, tx, token);
                }));
            }
            drop(tx);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some((src, dst, iface)) => {
                            Arc::clone(&self.evaluator)
                                .spawn_pair(src, dst, Origin::interface(iface));
                        }
                        // All capture threads gone (e.g. no permissions).
                        None => break,
                    }
                }
            }

            for worker in workers {
                let _ = worker.await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFF_UP: u32 = 0x1;
    const IFF_LOOPBACK: u32 = 0x8;

    fn iface(name: &str, flags: u32) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips: Vec::new(),
            flags,
        }
    }

    #[test]
    fn container_interface_prefixes_are_recognized() {
        assert!(is_container_interface("docker0"));
        assert!(is_container_interface("br-1a2b3c4d5e6f"));
        assert!(is_container_interface("veth0a1b2c3"));
        assert!(!is_container_interface("eth0"));
        assert!(!is_container_interface("ens192"));
        assert!(!is_container_interface("wlan0"));
        // "bridge0" is not a docker-created "br-" interface.
        assert!(!is_container_interface("bridge0"));
    }

    #[test]
    fn container_and_loopback_interfaces_are_not_capturable() {
        assert!(capturable(&iface("eth0", IFF_UP)));
        assert!(!capturable(&iface("docker0", IFF_UP)));
        assert!(!capturable(&iface("br-1a2b3c4d5e6f", IFF_UP)));
        assert!(!capturable(&iface("veth0a1b2c3", IFF_UP)));
        assert!(!capturable(&iface("lo", IFF_UP | IFF_LOOPBACK)));
        assert!(!capturable(&iface("eth1", 0)));
    }

    fn ipv4_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut frame = vec![0u8; 34];
        frame[12] = 0x08;
        frame[13] = 0x00;
        frame[26..30].copy_from_slice(&src);
        frame[30..34].copy_from_slice(&dst);
        frame
    }

    #[test]
    fn parses_ipv4_frame() {
        let frame = ipv4_frame([203, 0, 113, 9], [198, 51, 100, 4]);
        let (src, dst) = parse_frame(&frame).unwrap();
        assert_eq!(src, "203.0.113.9");
        assert_eq!(dst, "198.51.100.4");
    }

    #[test]
    fn parses_ipv6_frame() {
        let mut frame = vec![0u8; 54];
        frame[12] = 0x86;
        frame[13] = 0xDD;
        let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
        let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
        frame[22..38].copy_from_slice(&src.octets());
        frame[38..54].copy_from_slice(&dst.octets());

        let (parsed_src, parsed_dst) = parse_frame(&frame).unwrap();
        assert_eq!(parsed_src, "2001:db8::1");
        assert_eq!(parsed_dst, "2001:db8::2");
    }

    #[test]
    fn rejects_non_ip_ethertypes() {
        let mut frame = vec![0u8; 64];
        frame[12] = 0x08;
        frame[13] = 0x06; // ARP
        assert!(parse_frame(&frame).is_none());
    }

    #[test]
    fn rejects_truncated_frames() {
        assert!(parse_frame(&[]).is_none());
        assert!(parse_frame(&[0u8; 13]).is_none());
        let mut short_v4 = vec![0u8; 20];
        short_v4[12] = 0x08;
        short_v4[13] = 0x00;
        assert!(parse_frame(&short_v4).is_none());
    }
}
