//! Identity types for the post-processing pipeline.
//!
//! All handles are newtypes over `u32` handed out by an external component
//! (capture layer or encode backend). The value `0` is reserved to mean
//! "absent / not yet assigned" and is never a valid lookup key.

use std::fmt;

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(0);

            #[inline]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == Self::INVALID {
                    write!(f, concat!(stringify!($name), "(INVALID)"))
                } else {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

handle_id! {
    /// Backend-assigned encode job id.
    JobId
}

handle_id! {
    /// Encode session handle. One per pipeline activation.
    SessionId
}

handle_id! {
    /// Client handle returned by `EncodeBackend::open`.
    ClientHandle
}

handle_id! {
    /// Capture or reprocess channel handle.
    ChannelId
}

handle_id! {
    /// Stream handle within a channel.
    StreamId
}
