#![no_main]

use libfuzzer_sys::fuzz_target;
use spvi_ir::{IntrospectionParams, ShaderModule};
use spvi_reflect::Introspector;
use spvi_reflect::decode::{SpirvModule, stage_of};

fuzz_target!(|data: &[u8]| {
    // Decoding and introspecting arbitrary bytes should never panic.
    let Ok(module) = SpirvModule::parse(data) else {
        return;
    };
    let shader = ShaderModule::spirv(data.to_vec());
    let introspector = Introspector::default();
    for entry in module.entry_points() {
        let Some(stage) = stage_of(entry.model) else {
            continue;
        };
        let params = IntrospectionParams::new(shader.clone(), entry.name.clone(), stage);
        if let Ok(result) = introspector.introspect_module(&module, &params) {
            let _ = spvi_ir::dump_stage(&result);
        }
    }
});
