pub mod dataset;
pub mod pixel;
pub mod report;
pub mod tensor;
pub mod transforms;
