// src/services/search.rs
//! Pesquisa de texto livre das listagens e do relatório.
//!
//! A comparação é feita em Rust: o `LIKE` do SQLite só ignora maiúsculas em
//! ASCII ("LUCÍA" não encontraria "Lucía") e trata `%` e `_` como curingas.

/// Texto a procurar, já sem espaços nas pontas e em minúsculas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchText(String);

impl SearchText {
    /// `None` quando não há nada para procurar.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SearchText(s.to_lowercase()))
    }

    /// Algum dos campos contém o texto (sem distinguir maiúsculas)?
    pub fn matches<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&self.0))
    }
}

/// Filtra `items` mantendo a ordem; sem pesquisa devolve tudo.
pub fn filter_by<T, F>(items: Vec<T>, search: Option<&SearchText>, fields: F) -> Vec<T>
where
    F: Fn(&SearchText, &T) -> bool,
{
    match search {
        Some(search) => items.into_iter().filter(|item| fields(search, item)).collect(),
        None => items,
    }
}
