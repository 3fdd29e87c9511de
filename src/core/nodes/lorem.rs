use log::trace;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::context::Context;
use crate::core::expression::FilterExpression;

const COMMON_P: &str = "Lorem ipsum dolor sit amet, consectetur adipisicing elit, sed do eiusmod tempor \
incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco \
laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in reprehenderit in voluptate velit \
esse cillum dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa \
qui officia deserunt mollit anim id est laborum.";

const COMMON_WORDS: [&str; 19] = [
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipisicing", "elit", "sed", "do", "eiusmod",
    "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
];

const WORDS: &[&str] = &[
    "exercitationem", "perferendis", "perspiciatis", "laborum", "eveniet", "sunt", "iure", "nam", "nobis",
    "eum", "cum", "officiis", "excepturi", "odio", "consectetur", "quasi", "aut", "quisquam", "vel",
    "eligendi", "itaque", "non", "odit", "tempore", "quaerat", "dignissimos", "facilis", "neque", "nihil",
    "expedita", "vitae", "vero", "ipsum", "nisi", "animi", "cumque", "pariatur", "velit", "modi", "natus",
    "iusto", "eaque", "sequi", "illo", "sed", "ex", "et", "voluptatibus", "tempora", "veritatis", "ratione",
    "assumenda", "incidunt", "nostrum", "placeat", "aliquid", "fuga", "provident", "praesentium", "rem",
    "necessitatibus", "suscipit", "adipisci", "quidem", "possimus", "voluptas", "debitis", "sint",
    "accusantium", "unde", "sapiente", "voluptate", "qui", "aspernatur", "laudantium", "soluta", "amet",
    "quo", "aliquam", "saepe", "culpa", "libero", "ipsa", "dicta", "reiciendis", "nesciunt", "doloribus",
    "autem", "impedit", "minima", "maiores", "repudiandae", "ipsam", "obcaecati", "ullam", "enim", "totam",
    "delectus", "ducimus", "quis", "voluptates", "dolores", "molestiae", "harum", "dolorem", "quia",
    "voluptatem", "molestias", "magni", "distinctio", "omnis", "illum", "dolorum", "voluptatum", "ea",
    "quas", "quam", "corporis", "quae", "blanditiis", "atque", "deserunt", "laboriosam", "earum",
    "consequuntur", "hic", "cupiditate", "quibusdam", "accusamus", "ut", "rerum", "error", "minus", "eius",
    "ab", "ad", "nemo", "fugit", "officia", "at", "in", "id", "quos", "reprehenderit", "numquam", "iste",
    "fugiat", "sit", "inventore", "beatae", "repellendus", "magnam", "recusandae", "quod", "explicabo",
    "doloremque", "aperiam", "consequatur", "asperiores", "commodi", "optio", "dolor", "labore",
    "temporibus", "repellat", "veniam", "architecto", "est", "esse", "mollitia", "nulla", "a", "similique",
    "eos", "alias", "dolore", "tenetur", "deleniti", "porro", "facere", "maxime", "corrupti",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoremMethod {
    /// `w`: a run of words.
    Words,
    /// `p`: paragraphs wrapped in `<p>` elements.
    Html,
    /// `b`: plain paragraphs separated by blank lines.
    Plain,
}

impl LoremMethod {
    pub fn from_bit(bit: &str) -> Option<LoremMethod> {
        match bit {
            "w" => Some(LoremMethod::Words),
            "p" => Some(LoremMethod::Html),
            "b" => Some(LoremMethod::Plain),
            _ => None,
        }
    }
}

/// `lorem [count] [w|p|b] [random]`: placeholder latin text.
#[derive(Debug, Clone)]
pub struct LoremNode {
    count: FilterExpression,
    method: LoremMethod,
    common: bool,
}

impl LoremNode {
    pub fn new(count: FilterExpression, method: LoremMethod, common: bool) -> Self {
        Self { count, method, common }
    }

    pub fn render(&self, ctx: &Context<'_>) -> String {
        let count = self.count.resolve_quiet(ctx).to_int().unwrap_or(1);
        trace!("LoremNode: {} x {:?} (common: {})", count, self.method, self.common);
        match self.method {
            LoremMethod::Words => words(count, self.common),
            LoremMethod::Html => paragraphs(count, self.common)
                .iter()
                .map(|para| format!("<p>{}</p>", para))
                .collect::<Vec<_>>()
                .join("\n\n"),
            LoremMethod::Plain => paragraphs(count, self.common).join("\n\n"),
        }
    }
}

fn sample(rng: &mut impl Rng, amount: usize) -> Vec<&'static str> {
    WORDS.choose_multiple(rng, amount).copied().collect()
}

/// `count` words; with `common` they start with the classic opening.
/// A negative count drops that many words from the end of the opening.
pub fn words(count: i64, common: bool) -> String {
    let mut rng = rand::rng();
    let mut list: Vec<&str> = if common { COMMON_WORDS.to_vec() } else { Vec::new() };
    let have = list.len() as i64;
    if count > have {
        let mut missing = (count - have) as usize;
        while missing > 0 {
            let take = missing.min(WORDS.len());
            list.extend(sample(&mut rng, take));
            missing -= take;
        }
    } else {
        let keep = if count < 0 { (have + count).max(0) } else { count };
        list.truncate(keep as usize);
    }
    list.join(" ")
}

fn sentence(rng: &mut impl Rng) -> String {
    let sections: Vec<String> = (0..rng.random_range(1..=5))
        .map(|_| {
            let amount = rng.random_range(3..=12);
            sample(rng, amount).join(" ")
        })
        .collect();
    let joined = sections.join(", ");
    let mut chars = joined.chars();
    let first: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
    let end = if rng.random_bool(0.5) { '?' } else { '.' };
    format!("{}{}{}", first, chars.as_str(), end)
}

fn paragraph(rng: &mut impl Rng) -> String {
    (0..rng.random_range(1..=4)).map(|_| sentence(rng)).collect::<Vec<_>>().join(" ")
}

/// `count` paragraphs; with `common` the first is the classic one.
pub fn paragraphs(count: i64, common: bool) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count.max(0))
        .map(|i| if common && i == 0 { COMMON_P.to_string() } else { paragraph(&mut rng) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_words_come_first() {
        assert_eq!(words(3, true), "lorem ipsum dolor");
        assert_eq!(words(-17, true), "lorem ipsum");
        assert_eq!(words(0, true), "");
        let many = words(40, true);
        assert!(many.starts_with(COMMON_P[..11].to_lowercase().as_str()));
        assert_eq!(many.split(' ').count(), 40);
        assert_eq!(words(500, false).split(' ').count(), 500);
    }

    #[test]
    fn paragraphs_start_with_the_classic_one() {
        let paras = paragraphs(3, true);
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[0], COMMON_P);
        assert!(paras[1..].iter().all(|p| p.ends_with('.') || p.ends_with('?')));
        assert!(paragraphs(-1, true).is_empty());
    }
}
