//! Static use: which ids an entry point can reach.

use std::collections::HashSet;

use rspirv::spirv::Word;

use crate::decode::{EntryPoint, SpirvModule};

/// Ids in the entry point's interface plus every id referenced by a function
/// reachable from it through `OpFunctionCall`.
pub(crate) fn statically_used(module: &SpirvModule, entry: &EntryPoint) -> HashSet<Word> {
    let mut used: HashSet<Word> = entry.interface.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut pending = vec![entry.function];
    while let Some(function) = pending.pop() {
        if !visited.insert(function) {
            continue;
        }
        let Some(body) = module.function(function) else {
            log::warn!("entry point '{}' calls undefined function %{function}", entry.name);
            continue;
        };
        used.extend(body.references.iter().copied());
        pending.extend(body.callees.iter().copied());
    }
    used
}
