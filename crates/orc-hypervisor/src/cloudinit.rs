//! Cloud-init parameter construction: password generation, SSH-key line
//! formatting, and the double-URL-encoding wire quirk.

use rand::rngs::OsRng;
use rand::Rng;

const PASSWORD_LENGTH: usize = 16;
const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// How many times the `sshkeys` (and other doubly-encoded) form values are
/// URL-encoded before being sent. A single constant so the workaround stays
/// consistent if a future hypervisor version changes it.
pub const ENCODING_DEPTH: usize = 2;

/// 16-char random password over `[A-Za-z0-9!@#$%^&*]`, drawn from a CSPRNG
/// (`OsRng`, not `thread_rng`).
pub fn generate_password() -> String {
    let mut rng = OsRng;
    (0..PASSWORD_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_CHARSET.len());
            PASSWORD_CHARSET[idx] as char
        })
        .collect()
}

/// Each key is aggressively stripped of all whitespace/CR/LF/TAB, then
/// joined by exactly one `\n` between keys, with no trailing newline.
pub fn format_ssh_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    keys.into_iter().map(strip_whitespace).collect::<Vec<_>>().join("\n")
}

fn strip_whitespace(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Applies `ENCODING_DEPTH` passes of URL-encoding, matching the target
/// hypervisor's documented double-encoding requirement for `sshkeys`.
pub fn double_encode(value: &str) -> String {
    let mut encoded = value.to_string();
    for _ in 0..ENCODING_DEPTH {
        encoded = urlencoding::encode(&encoded).into_owned();
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_has_correct_length_and_charset() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn two_generated_passwords_differ() {
        assert_ne!(generate_password(), generate_password());
    }

    #[test]
    fn ssh_keys_joined_with_single_newline_no_trailing() {
        let keys = vec!["ssh-ed25519 AAAA foo@bar", "ssh-rsa BBBB baz@qux"];
        let formatted = format_ssh_keys(keys);
        assert_eq!(formatted, "ssh-ed25519AAAAfoo@bar\nssh-rsaBBBBbaz@qux");
        assert!(!formatted.ends_with('\n'));
    }

    #[test]
    fn whitespace_including_crlf_and_tabs_is_stripped() {
        let stripped = strip_whitespace("ssh-rsa\tAAAA\r\n comment");
        assert_eq!(stripped, "ssh-rsaAAAAcomment");
    }

    #[test]
    fn double_encode_applies_two_passes() {
        let once = urlencoding::encode("a b+c").into_owned();
        let twice = urlencoding::encode(&once).into_owned();
        assert_eq!(double_encode("a b+c"), twice);
    }
}
