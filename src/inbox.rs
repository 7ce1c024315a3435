//! Deterministic inbox generation for throughput runs.
//!
//! The inbox is a JSON file holding a single level of external messages:
//!
//! ```text
//! [[{"external": "<hex>"}, {"external": "<hex>"}, ...]]
//! ```
//!
//! Each external message is framed as:
//!
//! ```text
//!   tag: u8            = 0x01 (targeted)
//!   target: [u8; 20]   = first 20 bytes of SHA-256(rollup address)
//!   payload: bincode(Envelope)
//! ```
//!
//! Operations follow a "follow on" strategy. Every account is minted
//! `accounts + 1` tokens; account `k` then sends to account `k + 1`, which
//! sends one token less to the next account, and so on, wrapping around until
//! exactly the requested number of transfers exists.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Address = [u8; 20];

/// Frame tag for messages addressed to a specific rollup.
const TARGETED_TAG: u8 = 0x01;

/// Tag byte plus rollup hash.
const EXTERNAL_FRAME_SIZE: usize = 21;

/// Left-pad an account index into an address.
pub const fn address_of(index: u64) -> Address {
    let be = index.to_be_bytes();
    let mut out = [0u8; 20];
    let mut i = 0;
    while i < 8 {
        out[12 + i] = be[i];
        i += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Deploy the token contract.
    Deploy,
    Mint {
        to: Address,
        amount: u64,
        nonce: u64,
    },
    Transfer {
        from: Address,
        to: Address,
        value: u64,
        nonce: u64,
    },
}

/// What travels inside an external message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Index of the message in the inbox; stands in for the signing key.
    pub signer: u64,
    /// SHA-256 of the bincode-encoded operation.
    pub digest: [u8; 32],
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    External { external: String },
}

/// Levels of messages, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbox(pub Vec<Vec<Message>>);

impl Inbox {
    /// Inbox with no levels.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn message_count(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self).map_err(io::Error::other)?;
        writer.flush()
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(io::Error::other)
    }
}

/// Generate `transfers` transfers for `rollup_addr` and write them to `inbox_file`.
pub fn handle_generate(rollup_addr: &str, inbox_file: &Path, transfers: u64) -> io::Result<()> {
    generate_inbox(rollup_addr, transfers)?.save(inbox_file)
}

pub fn generate_inbox(rollup_addr: &str, transfers: u64) -> io::Result<Inbox> {
    let target = rollup_hash(rollup_addr);
    let messages = create_operations(transfers)
        .into_par_iter()
        .enumerate()
        .map(|(i, op)| encode_message(&target, i as u64, op))
        .collect::<io::Result<Vec<_>>>()?;
    Ok(Inbox(vec![messages]))
}

/// The generation strategy supports up to `accounts * (accounts - 1)` transfers;
/// pick the smallest account count that covers `transfers`.
pub fn accounts_for_transfers(transfers: u64) -> u64 {
    (transfers as f64).sqrt().ceil() as u64 + 1
}

/// Deploy, one mint per account, then exactly `transfers` transfers.
pub fn create_operations(transfers: u64) -> Vec<Operation> {
    let len = accounts_for_transfers(transfers) as usize;
    let addrs: Vec<Address> = (0..len as u64).map(address_of).collect();

    let mut operations = Vec::with_capacity(1 + len + transfers as usize);
    operations.push(Operation::Deploy);

    let amount = len as u64 + 1;
    for (nonce, to) in addrs.iter().enumerate() {
        operations.push(Operation::Mint {
            to: *to,
            amount,
            nonce: nonce as u64,
        });
    }

    let expected_len = operations.len() + transfers as usize;
    let mut nonces = vec![0u64; len];

    'outer: for token_id in 0..len {
        for (from, amount) in (token_id..token_id + len).zip(1..len) {
            if operations.len() == expected_len {
                break 'outer;
            }
            operations.push(Operation::Transfer {
                from: addrs[from % len],
                to: addrs[(from + 1) % len],
                value: (len - amount) as u64,
                nonce: nonces[from % len],
            });
            nonces[from % len] += 1;
        }
    }

    operations
}

fn rollup_hash(rollup_addr: &str) -> [u8; 20] {
    let digest = Sha256::digest(rollup_addr.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    out
}

fn encode_message(target: &[u8; 20], signer: u64, operation: Operation) -> io::Result<Message> {
    let op_bytes = bincode::serialize(&operation).map_err(io::Error::other)?;
    let envelope = Envelope {
        signer,
        digest: Sha256::digest(&op_bytes).into(),
        operation,
    };
    let payload = bincode::serialize(&envelope).map_err(io::Error::other)?;

    let mut frame = Vec::with_capacity(payload.len() + EXTERNAL_FRAME_SIZE);
    frame.push(TARGETED_TAG);
    frame.extend_from_slice(target);
    frame.extend_from_slice(&payload);

    Ok(Message::External {
        external: to_hex(&frame),
    })
}

/// Unframe a message, checking its target and digest.
#[cfg(test)]
fn decode_message(rollup_addr: &str, message: &Message) -> io::Result<Envelope> {
    let Message::External { external } = message;
    let frame = from_hex(external)?;
    if frame.len() < EXTERNAL_FRAME_SIZE || frame[0] != TARGETED_TAG {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a targeted external message",
        ));
    }
    if frame[1..EXTERNAL_FRAME_SIZE] != rollup_hash(rollup_addr) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "message targets another rollup",
        ));
    }
    let envelope: Envelope = bincode::deserialize(&frame[EXTERNAL_FRAME_SIZE..])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let op_bytes = bincode::serialize(&envelope.operation).map_err(io::Error::other)?;
    if <[u8; 32]>::from(Sha256::digest(&op_bytes)) != envelope.digest {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "digest mismatch"));
    }
    Ok(envelope)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
fn from_hex(s: &str) -> io::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "odd-length hex"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid hex"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ADDR: &str = "sr1UNDWPUYVeomgG15wn5jSw689EJ4RNnVQa";

    fn count_transfers(ops: &[Operation]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, Operation::Transfer { .. }))
            .count()
    }

    #[test]
    fn produces_exactly_the_requested_transfers() {
        for transfers in [0u64, 1, 2, 3, 4, 10, 99, 100, 500, 1001] {
            let ops = create_operations(transfers);
            let accounts = accounts_for_transfers(transfers) as usize;
            assert_eq!(count_transfers(&ops), transfers as usize, "T={transfers}");
            assert_eq!(ops.len(), 1 + accounts + transfers as usize);
            assert_eq!(ops[0], Operation::Deploy);
        }
    }

    #[test]
    fn account_count_covers_transfers() {
        for transfers in 1..2_000u64 {
            let n = accounts_for_transfers(transfers);
            assert!(n * (n - 1) >= transfers, "T={transfers} n={n}");
        }
        assert_eq!(accounts_for_transfers(100), 11);
    }

    #[test]
    fn nonces_increase_per_sender() {
        let ops = create_operations(50);
        let mut seen = std::collections::HashMap::new();
        for op in &ops {
            if let Operation::Transfer { from, nonce, .. } = op {
                let next = seen.entry(*from).or_insert(0u64);
                assert_eq!(*nonce, *next);
                *next += 1;
            }
        }
    }

    #[test]
    fn follow_on_transfers_chain_to_the_next_account() {
        let ops = create_operations(3);
        // 3 transfers -> 3 accounts, values 2, 1 then wrap to the next token.
        let transfers: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::Transfer { from, to, value, .. } => Some((*from, *to, *value)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transfers,
            [
                (address_of(0), address_of(1), 2),
                (address_of(1), address_of(2), 1),
                (address_of(1), address_of(2), 2),
            ]
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_inbox(ADDR, 64).unwrap();
        let b = generate_inbox(ADDR, 64).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 1);
        assert_eq!(a.message_count(), create_operations(64).len());
    }

    #[test]
    fn messages_decode_for_their_rollup_only() {
        let inbox = generate_inbox(ADDR, 5).unwrap();
        let first = &inbox.0[0][0];
        let env = decode_message(ADDR, first).unwrap();
        assert_eq!(env.signer, 0);
        assert_eq!(env.operation, Operation::Deploy);

        let err = decode_message("sr1SomeOtherRollup", first).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inbox.json");
        handle_generate(ADDR, &path, 20).unwrap();
        let loaded = Inbox::load(&path).unwrap();
        assert_eq!(loaded, generate_inbox(ADDR, 20).unwrap());

        let empty = dir.path().join("empty.json");
        Inbox::empty().save(&empty).unwrap();
        assert_eq!(std::fs::read_to_string(&empty).unwrap(), "[]");
        assert_eq!(Inbox::load(&empty).unwrap().message_count(), 0);
    }
}
