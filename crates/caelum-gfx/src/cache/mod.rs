pub mod layout_cache;
pub mod object_cache;
pub mod sampler_cache;
