//! Platform limits for mapped column files.

#[cfg(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "powerpc64",
    target_arch = "mips64",
    target_arch = "loongarch64"
))]
/// Largest mmap size this crate will attempt on a 64-bit target.
pub const MAX_MAP_SIZE: u64 = 0xFFFFFFFFFFFF; // 256TB

#[cfg(any(
    target_arch = "x86",
    target_arch = "arm",
    target_arch = "mips",
    target_arch = "powerpc"
))]
/// Largest mmap size this crate will attempt on a 32-bit target.
pub const MAX_MAP_SIZE: u64 = 0x7FFFFFFF; // 2GB
