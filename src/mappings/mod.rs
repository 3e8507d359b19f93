pub mod key_name_to_vk;

pub use key_name_to_vk::KeyNameToVk;
