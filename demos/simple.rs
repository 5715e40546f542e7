use binpatch::{format_bytes, PatchSpec, PatchStatus, Signature};

pub fn main() {
    let haystack = &[
        0x11, 0x22, 0x33, 0x0, 0x0, 0x11, 0x22, 0x33, 0x11, 0x0, 0x33,
    ];
    let signature = Signature::compile("11 ?? 33").expect("Should be valid signature");
    for (pos, view) in signature.scan(haystack) {
        println!("found needle at {} with bytes {:?}!", pos, view);
    }

    let mut buffer = haystack.to_vec();
    let patch = PatchSpec::from_hex("EE FF", 1).expect("Should be valid patch");
    match patch.apply(&mut buffer, &signature) {
        Ok(PatchStatus::Applied(outcome)) => println!(
            "patched {} -> {} at {:#x}",
            format_bytes(&outcome.original),
            format_bytes(&outcome.patched),
            outcome.write_offset
        ),
        Ok(PatchStatus::NotFound) => println!("signature not found"),
        Err(e) => println!("patch failed: {e}"),
    }
}
