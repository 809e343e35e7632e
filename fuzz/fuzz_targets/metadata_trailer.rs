#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let cfg = sigpatch::PatcherConfig::default();
    let _ = sigpatch::inspect::extract_patch_info_from_bytes(data, &cfg);
});
