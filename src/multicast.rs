// multicast.rs

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use anyhow::Context;
use log::*;
use serde::{Deserialize, Serialize};

use crate::SensorRecord;

const MCAST_TTL: u32 = 1;

/// One reading as broadcast on the local network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MulticastMessage {
    pub name: String,
    pub sensor: String,
    pub temperature: f32,
    pub offset: f32,
}

impl MulticastMessage {
    pub fn new(record: &SensorRecord, raw: f32) -> Self {
        Self {
            name: record.name.clone(),
            sensor: record.id.clone(),
            temperature: record.adjust(raw),
            offset: record.offset,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Sends single datagrams to a group address.
pub trait DatagramSender {
    fn send(&mut self, dest: SocketAddrV4, payload: &[u8]) -> anyhow::Result<()>;
}

/// Opens a fresh socket for every datagram and drops it afterwards.
#[derive(Clone, Debug, Default)]
pub struct UdpMulticast;

impl DatagramSender for UdpMulticast {
    fn send(&mut self, dest: SocketAddrV4, payload: &[u8]) -> anyhow::Result<()> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).context("UDP bind failed")?;
        if let Err(e) = sock.set_multicast_ttl_v4(MCAST_TTL) {
            warn!("Cannot set multicast TTL: {e}");
        }
        let n = sock
            .send_to(payload, dest)
            .with_context(|| format!("UDP send to {dest} failed"))?;
        debug!("Sent {n} bytes to {dest}");
        Ok(())
    }
}

pub struct MulticastChannel<D> {
    dest: SocketAddrV4,
    sender: D,
}

impl<D: DatagramSender> MulticastChannel<D> {
    pub fn new(dest: SocketAddrV4, sender: D) -> Self {
        info!("Multicast to {dest}");
        Self { dest, sender }
    }

    pub fn dest(&self) -> SocketAddrV4 {
        self.dest
    }

    pub fn send(&mut self, record: &SensorRecord, raw: f32) -> anyhow::Result<()> {
        let msg = MulticastMessage::new(record, raw);
        self.sender.send(self.dest, &msg.to_json()?)
    }
}


// EOF
