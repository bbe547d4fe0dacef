use actix_web::{HttpResponse, Responder, get};
use serde::Serialize;

use crate::language::{Backend, Language};

#[derive(Serialize, Debug)]
pub struct LanguageInfo {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    /// `false` for languages whose toolchain is only probed
    pub executable: bool,
}

#[get("/languages")]
pub async fn get_languages_handler() -> impl Responder {
    let languages: Vec<LanguageInfo> = Language::ALL
        .into_iter()
        .map(|language| LanguageInfo {
            name: language.id(),
            aliases: language.aliases(),
            executable: language.backend() != Backend::Pending,
        })
        .collect();
    HttpResponse::Ok().json(languages)
}
