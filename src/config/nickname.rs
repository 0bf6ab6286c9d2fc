//! Default nickname generator.
//!
//! Produces `ircbot` followed by four digits (e.g. `ircbot4821`) so two bots
//! started from an empty config rarely collide on the same server.

use rand::RngExt;

const BASE: &str = "ircbot";

pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let suffix: u16 = rng.random_range(1000..10000);
    format!("{}{}", BASE, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_nick_shape() {
        let nick = generate_nickname();
        assert_eq!(nick.len(), BASE.len() + 4);
        assert!(nick.starts_with(BASE));
        assert!(nick[BASE.len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
