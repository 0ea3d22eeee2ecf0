//! 채널과 구독에 공통으로 쓰이는 타입.

pub mod role;
pub mod subscription;

pub use role::Role;
pub use subscription::{Instruments, SubscriptionTemplate};
