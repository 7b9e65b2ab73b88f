#![no_main]
use libfuzzer_sys::fuzz_target;
use sunward::config::RegisterMap;

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a u16 register stream in big-endian pairs
    let mut regs = Vec::new();
    let mut it = data.chunks_exact(2);
    for b in &mut it {
        regs.push(u16::from_be_bytes([b[0], b[1]]));
    }

    // Exercise the block decoder under varying (often truncated) lengths
    let map = RegisterMap::default();
    let _ = sunward::inverter::snapshot_from_block(&regs, &map, chrono::Utc::now());
    for &word in &regs {
        let _ = sunward::inverter::as_signed(word);
    }
});
