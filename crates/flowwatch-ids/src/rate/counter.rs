use std::collections::HashMap;
use std::net::IpAddr;

use crate::record::FlowRecord;

/// Flow identity used for creation counting: `(src, dst, dport)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CreationKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub dst_port: Option<u16>,
}

impl From<&FlowRecord> for CreationKey {
    fn from(r: &FlowRecord) -> Self {
        Self {
            src: r.src,
            dst: r.dst,
            dst_port: r.dst_port,
        }
    }
}

/// Counts flows first seen in the current window.
///
/// A flow is new when it appeared neither in the previous window nor
/// earlier in the current one.
#[derive(Debug)]
pub struct FlowCreationCounter {
    last_seen: HashMap<CreationKey, u64>,
    window: u64,
    created: u64,
    capacity: usize,
}

impl FlowCreationCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            last_seen: HashMap::new(),
            window: 0,
            created: 0,
            capacity,
        }
    }

    pub fn observe(&mut self, record: &FlowRecord) {
        let key = CreationKey::from(record);
        let window = self.window;
        match self.last_seen.get_mut(&key) {
            Some(seen) => *seen = window,
            None => {
                self.created += 1;
                if self.last_seen.len() < self.capacity {
                    self.last_seen.insert(key, window);
                }
            }
        }
    }

    /// New flows so far in this window.
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    /// Close the window: forget flows idle for a full window.
    pub fn roll(&mut self) {
        let window = self.window;
        self.last_seen.retain(|_, seen| *seen == window);
        self.window += 1;
        self.created = 0;
    }
}
