//! Fixtures shared by the camsync end-to-end tests.

#![forbid(unsafe_code)]

use cams_remote::InMemoryFleet;

const BLOCK: usize = 2880;

fn card(text: &str) -> String {
    format!("{text:<80}")
}

fn header(cards: &[String]) -> Vec<u8> {
    let mut out = cards.concat().into_bytes();
    out.extend(card("END").into_bytes());
    out.resize(out.len().div_ceil(BLOCK) * BLOCK, b' ');
    out
}

/// A capture file as the stations write it: an empty primary HDU followed by
/// a 16-bit image extension holding the max-pixel frame.
pub fn capture_fits(width: usize, height: usize, values: &[u16]) -> Vec<u8> {
    let mut bytes = header(&[
        card("SIMPLE  =                    T"),
        card("BITPIX  =                    8"),
        card("NAXIS   =                    0"),
        card("EXTEND  =                    T"),
    ]);
    bytes.extend(header(&[
        card("XTENSION= 'IMAGE   '"),
        card("BITPIX  =                   16"),
        card("NAXIS   =                    2"),
        card(&format!("NAXIS1  = {width:>20}")),
        card(&format!("NAXIS2  = {height:>20}")),
        card("PCOUNT  =                    0"),
        card("GCOUNT  =                    1"),
        card("BZERO   =                32768"),
        card("BSCALE  =                    1"),
    ]));
    let mut data: Vec<u8> = values
        .iter()
        .flat_map(|v| ((i32::from(*v) - 32768) as i16).to_be_bytes())
        .collect();
    data.resize(data.len().div_ceil(BLOCK) * BLOCK, 0);
    bytes.extend(data);
    bytes
}

/// Add `captures` decodable 8x4 frames to `directory` of `station`, one per
/// minute from 22:00 on the directory's night.
pub fn add_night(fleet: &InMemoryFleet, station: &str, directory: &str, captures: u32) {
    let date = directory.split('_').nth(1).unwrap_or("19700101");
    for i in 0..captures {
        let name = format!(
            "FF_{station}_{date}_{:02}{:02}00_000_{:07}.fits",
            22 + i / 60,
            i % 60,
            i * 256
        );
        let values: Vec<u16> = (0..32).map(|p| (p as u16) * 100 + i as u16).collect();
        fleet.add_file(station, directory, &name, capture_fits(8, 4, &values));
    }
}
