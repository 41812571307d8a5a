//! Lectura de configuración desde variables de entorno.

use std::{fmt::Display, str::FromStr};
use tracing::warn;

/// Valor de la variable `key` ya leída, o `default` si falta o no parsea.
pub fn parse_or<T: FromStr + Copy + Display>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(s) => s.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} no es válido, se usa {}", key, s, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_recorta_y_cae_al_defecto() {
        assert_eq!(parse_or("X", None, 7u32), 7);
        assert_eq!(parse_or("X", Some(" 12 ".to_string()), 7u32), 12);
        assert_eq!(parse_or("X", Some("doce".to_string()), 7u32), 7);
        assert_eq!(parse_or("X", Some("-1".to_string()), 7u64), 7);
    }
}
