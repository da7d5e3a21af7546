//! Synthetic FSB5 banks, built at runtime so no binary fixtures are committed.

#![allow(dead_code)]

use std::path::Path;

pub const PCM16: u32 = 2;
pub const PCM24: u32 = 3;
pub const PCM_FLOAT: u32 = 5;
pub const VORBIS: u32 = 15;

/// One stream of a synthetic bank.
pub struct Track {
    pub name: Option<&'static str>,
    pub payload: Vec<u8>,
}

impl Track {
    pub fn named(name: &'static str, payload: Vec<u8>) -> Self {
        Self {
            name: Some(name),
            payload,
        }
    }

    pub fn unnamed(payload: Vec<u8>) -> Self {
        Self {
            name: None,
            payload,
        }
    }
}

/// Builds a version 1 FSB5 bank whose streams all share `format`, `channels` (1 or 2) and a
/// 44.1 kHz sample rate. Payloads are padded to 32 bytes as FMOD does.
pub fn fsb5(format: u32, channels: u8, bytes_per_sample: u64, tracks: &[Track]) -> Vec<u8> {
    let has_names = tracks.iter().any(|track| track.name.is_some());

    let mut headers = Vec::new();
    let mut offsets = Vec::new();
    let mut names = Vec::new();
    let mut data = Vec::new();

    for track in tracks {
        let samples = track.payload.len() as u64 / (u64::from(channels) * bytes_per_sample);
        let channel_index = u64::from(channels == 2);
        let mode = (samples << 34)
            | ((data.len() as u64 / 32) << 7)
            | (channel_index << 5)
            | (8 << 1);
        headers.extend_from_slice(&mode.to_le_bytes());

        offsets.push(names.len());
        names.extend_from_slice(track.name.unwrap_or_default().as_bytes());
        names.push(0);

        data.extend_from_slice(&track.payload);
        data.resize((data.len() + 31) / 32 * 32, 0);
    }

    let mut name_table = Vec::new();
    if has_names {
        let table_start = offsets.len() * 4;
        for offset in offsets {
            name_table.extend_from_slice(&((table_start + offset) as u32).to_le_bytes());
        }
        name_table.extend_from_slice(&names);
        name_table.resize((name_table.len() + 15) / 16 * 16, 0);
    }

    let mut bank = Vec::new();
    bank.extend_from_slice(b"FSB5");
    bank.extend_from_slice(&1u32.to_le_bytes());
    bank.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
    bank.extend_from_slice(&(headers.len() as u32).to_le_bytes());
    bank.extend_from_slice(&(name_table.len() as u32).to_le_bytes());
    bank.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bank.extend_from_slice(&format.to_le_bytes());
    bank.resize(60, 0);
    bank.extend_from_slice(&headers);
    bank.extend_from_slice(&name_table);
    bank.extend_from_slice(&data);
    bank
}

/// Wraps FSB5 banks in junk the way a Studio `.bank` file does.
pub fn studio_bank(embedded: &[Vec<u8>]) -> Vec<u8> {
    let mut bank = b"RIFF\x00\x00\x00\x00FEV FMT ".to_vec();

    for (index, fsb) in embedded.iter().enumerate() {
        // odd-length padding so embedded banks are not aligned
        bank.extend(std::iter::repeat(0xA5).take(3 + 2 * index));
        bank.extend_from_slice(b"SND ");
        bank.extend_from_slice(fsb);
    }

    bank.extend_from_slice(b"LIST FSB");
    bank
}

pub fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Checks the invariants every output file must satisfy and returns its sample data.
pub fn read_wav(path: &Path) -> (Vec<u8>, Vec<u8>) {
    let bytes = std::fs::read(path).unwrap();
    assert!(bytes.len() >= 44, "{} is too short", path.display());
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..16], b"WAVEfmt ");
    assert_eq!(&bytes[36..40], b"data");

    let data_size = u32_at(&bytes, 40) as usize;
    assert_eq!(data_size, bytes.len() - 44);
    assert_eq!(u32_at(&bytes, 4) as usize, 36 + data_size);

    let channels = u32::from(u16_at(&bytes, 22));
    let rate = u32_at(&bytes, 24);
    let bits = u32::from(u16_at(&bytes, 34));
    assert_eq!(u32_at(&bytes, 28), rate * channels * bits / 8);
    assert_eq!(u32::from(u16_at(&bytes, 32)), channels * bits / 8);

    let data = bytes[44..].to_vec();
    let mut header = bytes;
    header.truncate(44);
    (header, data)
}
