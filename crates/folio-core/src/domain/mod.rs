//! 가격 분석을 위한 도메인 모델.

mod horizon;
mod observation;
mod price_change;
mod tracking;

pub use horizon::*;
pub use observation::*;
pub use price_change::*;
pub use tracking::*;
