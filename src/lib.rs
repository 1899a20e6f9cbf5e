pub mod chunk;
pub mod db;
pub mod decode;
pub mod import;
pub mod normalize;
pub mod writer;
