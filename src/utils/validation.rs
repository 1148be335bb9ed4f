use rand::Rng;
use validator::Validate;

use crate::utils::ApiError;

pub fn validate_dto<T: Validate>(dto: &T) -> Result<(), ApiError> {
    dto.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

/// URL slug from a service name, with a random suffix to keep slugs unique
/// across same-named services.
pub fn slugify(name: &str) -> String {
    let base: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let base = base.split_whitespace().collect::<Vec<_>>().join("-");
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    if base.is_empty() {
        format!("service-{}", suffix)
    } else {
        format!("{}-{}", base, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        let slug = slugify("Mock Interview Prep!");
        assert!(slug.starts_with("mock-interview-prep-"));
        let suffix = slug.rsplit('-').next().unwrap();
        assert!(suffix.parse::<u32>().unwrap() < 1000);
    }

    #[test]
    fn slugify_handles_symbol_only_names() {
        let slug = slugify("!!!");
        assert!(slug.starts_with("service-"));
    }
}
