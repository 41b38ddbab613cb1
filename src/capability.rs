//! Linux file capability codec.
//!
//! File capabilities are stored in the `security.capability` xattr as a
//! `vfs_cap_data` struct: a little-endian magic word followed by
//! `(permitted, inheritable)` word pairs. This module translates that packed
//! form (or the comma-separated hex text some image tools print) into tokens
//! like `cap_net_admin+p`.
//!
//! Decoding never fails: malformed input yields an empty token list.
//!
//! Layout and bit addressing follow `include/uapi/linux/capability.h`.

use std::collections::HashSet;

/// Capability names in kernel index order (`CAP_CHOWN` = 0 ...).
pub const CAPABILITY_NAMES: [&str; 38] = [
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
];

pub const CAP_NET_ADMIN: u32 = 12;
pub const CAP_LAST_CAP: u32 = 37;

/// `VFS_CAP_REVISION_2`, written as the magic word when encoding.
pub const VFS_CAP_REVISION_2: u32 = 0x0200_0000;

/// Largest xattr payload we look at (revision 3 adds a root uid word).
pub const CAP_BYTE_SIZE_MAX: usize = 24;

/// Data words after the magic: two `(permitted, inheritable)` pairs.
const CAP_DATA_WORDS: usize = 4;
const CAP_OFFSET: usize = 2;

/// One of the two bit planes a capability can be set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Permitted = 0,
    Inheritable = 1,
}

/// Permitted and inheritable bit-vectors, interleaved as in `vfs_cap_data`:
/// `[permitted0, inheritable0, permitted1, inheritable1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    words: [u32; CAP_DATA_WORDS],
}

fn cap_valid(cap: u32) -> bool {
    cap <= CAP_LAST_CAP
}

fn cap_index(cap: u32) -> usize {
    (cap >> 5) as usize * CAP_OFFSET
}

fn cap_mask(cap: u32) -> u32 {
    1 << (cap & 31)
}

impl CapabilitySet {
    /// Build a set from data words (magic already stripped). Missing words
    /// are zero, extra words are ignored.
    pub fn from_words(words: &[u32]) -> Self {
        let mut set = Self::default();
        for (slot, word) in set.words.iter_mut().zip(words) {
            *slot = *word;
        }
        set
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Whether `cap` is set in `plane`.
    pub fn has(&self, cap: u32, plane: Plane) -> bool {
        if !cap_valid(cap) {
            return false;
        }
        self.words[cap_index(cap) + plane as usize] & cap_mask(cap) == cap_mask(cap)
    }

    /// Set `cap` in `plane`. Returns false for an unknown capability index.
    pub fn set(&mut self, cap: u32, plane: Plane) -> bool {
        if !cap_valid(cap) {
            return false;
        }
        self.words[cap_index(cap) + plane as usize] |= cap_mask(cap);
        true
    }

    /// Render as tokens in ascending capability order.
    pub fn to_text(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (i, name) in CAPABILITY_NAMES.iter().enumerate() {
            let cap = i as u32;
            let permitted = self.has(cap, Plane::Permitted);
            let inheritable = self.has(cap, Plane::Inheritable);
            if !permitted && !inheritable {
                continue;
            }
            let mut token = name.to_lowercase();
            token.push('+');
            if permitted {
                token.push('p');
            }
            if inheritable {
                token.push('i');
            }
            out.push(token);
        }
        out
    }

    /// Pack as a `vfs_cap_data` blob: magic word followed by the data words.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 * (CAP_DATA_WORDS + 1));
        out.extend_from_slice(&VFS_CAP_REVISION_2.to_le_bytes());
        for word in self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Parse a packed blob. `None` if the length is not a non-zero multiple
    /// of four.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() || raw.len() % 4 != 0 {
            return None;
        }
        let words: Vec<u32> = raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        // first word is the magic/revision
        let data = &words[1..];
        Some(Self::from_words(&data[..data.len().min(CAP_DATA_WORDS)]))
    }

    /// Parse tokens such as `cap_net_raw+pi`. Unknown names or plane letters
    /// are skipped.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut set = Self::default();
        for token in tokens {
            let Some((name, planes)) = token.as_ref().split_once('+') else {
                continue;
            };
            let Some(cap) = CAPABILITY_NAMES
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
            else {
                continue;
            };
            for plane in planes.chars() {
                match plane {
                    'p' => set.set(cap as u32, Plane::Permitted),
                    'i' => set.set(cap as u32, Plane::Inheritable),
                    _ => false,
                };
            }
        }
        set
    }
}

/// Decode a raw `security.capability` value.
pub fn decode_bytes(raw: &[u8]) -> Vec<String> {
    CapabilitySet::from_bytes(raw)
        .map(|set| set.to_text())
        .unwrap_or_default()
}

/// Decode the `0x2000001,0x1000,0x0,0x0,0x0` form printed by e2tools and
/// patched `unsquashfs`. The magic word is still the first entry.
pub fn decode_text(text: &str) -> Vec<String> {
    parse_text_words(text)
        .map(|words| {
            let raw: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            decode_bytes(&raw)
        })
        .unwrap_or_default()
}

fn parse_text_words(text: &str) -> Option<Vec<u32>> {
    let words = text
        .trim()
        .split(',')
        .map(|item| {
            let hex = item.trim().strip_prefix("0x")?;
            u32::from_str_radix(hex, 16).ok()
        })
        .collect::<Option<Vec<u32>>>()?;
    if words.len() > CAP_DATA_WORDS + 1 {
        return None;
    }
    Some(words)
}

/// Encode tokens into a packed blob that [`decode_bytes`] reverses.
pub fn encode<S: AsRef<str>>(tokens: &[S]) -> Vec<u8> {
    CapabilitySet::from_tokens(tokens).to_bytes()
}

/// Compare two token lists as sets.
pub fn caps_equal<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> bool {
    let a: HashSet<&str> = a.iter().map(|s| s.as_ref()).collect();
    let b: HashSet<&str> = b.iter().map(|s| s.as_ref()).collect();
    a == b
}
