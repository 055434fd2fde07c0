//! Test data generation for benchmarks.
//!
//! Books are derived from a fixed seed so every strategy inserts the same
//! rows and runs are reproducible.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::Book;

const SEED: u64 = 12345;

/// Days between the Unix epoch and 2000-01-01.
const EPOCH_TO_2000_DAYS: i64 = 10_957;

const AUTHORS: [&str; 10] = [
    "Alice Walker",
    "Bram Stoker",
    "Clarice Lispector",
    "Dante Alighieri",
    "Emily Bronte",
    "Franz Kafka",
    "Gabriel Garcia Marquez",
    "Haruki Murakami",
    "Isabel Allende",
    "Jorge Amado",
];

const GENRES: [&str; 6] = ["fiction", "fantasy", "horror", "biography", "poetry", "science"];

/// Generate a random string of specified length.
fn random_string(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

fn random_isbn(rng: &mut StdRng) -> String {
    let digits: String = (0..10)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("978{}", digits)
}

fn generate_book(rng: &mut StdRng, index: usize) -> Book {
    let days = EPOCH_TO_2000_DAYS + rng.gen_range(0..9_000);

    Book {
        id: 0,
        isbn: random_isbn(rng),
        title: format!("Book Title {}: {}", index, random_string(rng, 20)),
        author: AUTHORS[index % AUTHORS.len()].to_string(),
        genre: GENRES[index % GENRES.len()].to_string(),
        quantity: rng.gen_range(1..=500),
        publicized_at: DateTime::<Utc>::UNIX_EPOCH + Duration::days(days),
    }
}

/// A single unsaved book.
pub fn new_book() -> Book {
    let mut rng = StdRng::seed_from_u64(SEED);
    generate_book(&mut rng, 0)
}

/// `count` unsaved books with realistic field distribution.
pub fn generate_books(count: usize) -> Vec<Book> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..count).map(|i| generate_book(&mut rng, i)).collect()
}

/// Smallest multiple of `page_size` that covers `n` rows plus one extra page,
/// so at least two distinct pages exist.
pub fn paginated_seed_count(n: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    n.div_ceil(page_size) * page_size + page_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_books() {
        let books = generate_books(100);
        assert_eq!(books.len(), 100);
        assert!(books.iter().all(|b| !b.is_persisted()));

        // Check deterministic generation
        let books2 = generate_books(100);
        assert_eq!(books, books2);
    }

    #[test]
    fn test_book_fields() {
        let book = new_book();
        assert_eq!(book.isbn.len(), 13);
        assert!(book.isbn.starts_with("978"));
        assert!(book.isbn.chars().all(|c| c.is_ascii_digit()));
        assert!((1..=500).contains(&book.quantity));
        assert!(book.publicized_at >= DateTime::<Utc>::UNIX_EPOCH + Duration::days(EPOCH_TO_2000_DAYS));
        assert_eq!(book, generate_books(1)[0]);
    }

    #[test]
    fn test_reset_id() {
        let mut book = new_book();
        book.id = 42;
        assert!(book.is_persisted());
        book.reset_id();
        assert!(!book.is_persisted());
    }

    #[test]
    fn test_paginated_seed_count() {
        assert_eq!(paginated_seed_count(0, 10), 10);
        assert_eq!(paginated_seed_count(1, 10), 20);
        assert_eq!(paginated_seed_count(10, 10), 20);
        assert_eq!(paginated_seed_count(11, 10), 30);
        assert_eq!(paginated_seed_count(5, 0), 6);
    }
}
