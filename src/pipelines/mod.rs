pub mod bcl2qseq_map;
pub mod dist_bcl2qseq;
