// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use psx::psa::PsaReader;
use std::env;

/// A simple program that lists the bones and sequences of a PSA file
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Usage: psa_info [psa file]");
        return;
    }

    let psa_path = &args[1];

    // Only the bones and sequences are read here, keys stay on disk until asked for.
    let reader = match PsaReader::open(psa_path) {
        Ok(reader) => reader,
        Err(err) => {
            println!("Failed to read {}: {}", psa_path, err);
            return;
        }
    };

    for warning in reader.warnings() {
        println!("warning: {}", warning);
    }

    println!("{} bones:", reader.bones().len());
    for (index, bone) in reader.bones().iter().enumerate() {
        println!("  {:>3} {} (parent {})", index, bone.name, bone.parent_index);
    }

    println!("{} sequences:", reader.sequences().len());
    for sequence in reader.sequences() {
        println!(
            "  {} - {} frames at {} fps",
            sequence.name, sequence.frame_count, sequence.fps
        );
    }
}
