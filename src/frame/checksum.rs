//! Checksum algorithms for the frame checksum layer.

/// Supported algorithms; the result is truncated to the checksum field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    /// Arithmetic sum of all bytes.
    Sum,
    /// XOR of all bytes.
    Xor,
    /// CRC-16/CCITT-FALSE (poly 0x1021, init 0xffff, no reflection).
    Crc16,
    /// CRC-32 (IEEE, reflected).
    Crc32,
}

impl ChecksumAlgo {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(ChecksumAlgo::Sum),
            "xor" => Some(ChecksumAlgo::Xor),
            "crc16" => Some(ChecksumAlgo::Crc16),
            "crc32" => Some(ChecksumAlgo::Crc32),
            _ => None,
        }
    }

    pub fn compute(self, data: &[u8]) -> u64 {
        match self {
            ChecksumAlgo::Sum => data.iter().fold(0u64, |acc, &b| acc.wrapping_add(b as u64)),
            ChecksumAlgo::Xor => data.iter().fold(0u64, |acc, &b| acc ^ b as u64),
            ChecksumAlgo::Crc16 => crc16_ccitt(data) as u64,
            ChecksumAlgo::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(data);
                hasher.finalize() as u64
            }
        }
    }
}

fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc = 0xffffu16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
