pub mod badges;
pub mod sessions;
