/// The pluggable collectors and their shared mark/fixup machinery.
pub mod collector;
/// The managed word heap and the process-wide context.
pub mod heap;
/// Root registry and the `Handle` type.
pub mod roots;
/// XPM frame dumper.
pub mod snapshot;
/// Typed event trace and per-word visualization metadata.
pub mod trace;
