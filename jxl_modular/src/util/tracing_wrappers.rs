// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#[cfg(feature = "tracing")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, instrument, trace, warn};

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use jxl_macros::noop as instrument;

#[cfg(not(feature = "tracing"))]
#[macro_export]
#[doc(hidden)]
macro_rules! __jxl_modular_noop_log {
    ($($args:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::__jxl_modular_noop_log as debug;
#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::__jxl_modular_noop_log as error;
#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::__jxl_modular_noop_log as info;
#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::__jxl_modular_noop_log as trace;
#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::__jxl_modular_noop_log as warn;
