//! CRC-32 checksum used to verify the programmed application image.
//!
//! Standard reflected CRC-32 (IEEE 802.3): polynomial 0xEDB88320, initial
//! register 0xFFFFFFFF, final complement, LSB-first. The bootloader computes
//! the same value over its application region, so the local and the
//! device-reported checksums are directly comparable.

/// Reflected CRC-32 polynomial.
pub const CRC32_POLY: u32 = 0xEDB88320;

/// Initial CRC register value.
const CRC32_INIT: u32 = 0xFFFFFFFF;

const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculate the CRC-32 checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let crc = data
        .iter()
        .fold(CRC32_INIT, |crc, &byte| {
            CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
        });
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time reference implementation.
    fn crc32_bitwise(data: &[u8]) -> u32 {
        let mut crc = CRC32_INIT;
        for &byte in data {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ CRC32_POLY;
                } else {
                    crc >>= 1;
                }
            }
        }
        !crc
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(&[]), 0x00000000);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_single_byte() {
        assert_eq!(crc32(&[0x00]), 0xD202EF8D);
        assert_eq!(crc32(b"a"), 0xE8B7BE43);
    }

    #[test]
    fn test_crc32_is_stable() {
        let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        assert_eq!(crc32(&data), crc32(&data));
    }

    #[test]
    fn test_crc32_matches_bitwise_reference() {
        let samples: [&[u8]; 4] = [b"", b"bootloader", &[0xFF; 64], &[0x12, 0x34, 0x56, 0x78]];
        for sample in samples {
            assert_eq!(crc32(sample), crc32_bitwise(sample));
        }
    }

    #[test]
    fn test_crc32_single_bit_flip_changes_result() {
        let corpus: Vec<Vec<u8>> = vec![
            b"firmware image".to_vec(),
            (0..=255u8).collect(),
            vec![0xFF; 1024],
            vec![0x00; 7],
        ];

        for data in corpus {
            let original = crc32(&data);
            for byte in 0..data.len() {
                for bit in 0..8 {
                    let mut flipped = data.clone();
                    flipped[byte] ^= 1 << bit;
                    assert_ne!(crc32(&flipped), original, "flip at byte {byte} bit {bit}");
                }
            }
        }
    }
}
