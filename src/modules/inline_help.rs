//! Help menu served through the assistant's inline queries and buttons.
//!
//! Pages list [`PAGE_SIZE`] modules as buttons, two per row, followed by a
//! back/next row. Button payloads are `help_page_<n>` for a menu page and
//! `help:<module>:<page>` for a module, with spaces in the module name
//! written as underscores.

use crate::app::App;
use crate::commands::format_module_help;
use crate::locale::fill;
use crate::telegram::{CallbackReply, InlineArticle, MenuButton, MenuView};

/// Modules per menu page.
pub const PAGE_SIZE: usize = 6;

const BUTTONS_PER_ROW: usize = 2;

/// A decoded button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpCallback {
    Page(usize),
    /// A module opened from menu page `page`.
    Module { module: String, page: usize },
}

impl HelpCallback {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(page) = data.strip_prefix("help_page_") {
            return page.parse().ok().map(Self::Page);
        }
        let (module, page) = data.strip_prefix("help:")?.rsplit_once(':')?;
        if module.is_empty() {
            return None;
        }
        Some(Self::Module {
            module: module.replace('_', " "),
            page: page.parse().ok()?,
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Page(page) => format!("help_page_{page}"),
            Self::Module { module, page } => format!("help:{}:{}", module.replace(' ', "_"), page),
        }
    }
}

fn callback_button(text: impl Into<String>, callback: &HelpCallback) -> MenuButton {
    MenuButton::Callback {
        text: text.into(),
        data: callback.encode(),
    }
}

fn is_allowed(app: &App, sender_id: i64) -> bool {
    sender_id == app.owner.id || app.permissions.is_sudoer(sender_id)
}

/// Menu page `page`, clamped to the last page.
pub fn menu_page(app: &App, lang: &str, page: usize) -> MenuView {
    let modules = app.help.module_names();
    let last_page = modules.len().saturating_sub(1) / PAGE_SIZE;
    let page = page.min(last_page);
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(modules.len());

    let mut buttons: Vec<Vec<MenuButton>> = modules[start..end]
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|module| {
                    let target = HelpCallback::Module {
                        module: module.clone(),
                        page,
                    };
                    callback_button(module.as_str(), &target)
                })
                .collect()
        })
        .collect();

    let mut nav = Vec::new();
    if page > 0 {
        nav.push(callback_button(
            app.locales.tr_lang(lang, "help.back_btn"),
            &HelpCallback::Page(page - 1),
        ));
    }
    if end < modules.len() {
        nav.push(callback_button(
            app.locales.tr_lang(lang, "help.next_btn"),
            &HelpCallback::Page(page + 1),
        ));
    }
    if !nav.is_empty() {
        buttons.push(nav);
    }

    MenuView {
        text: app.locales.tr_lang(lang, "help.menu_title"),
        buttons,
    }
}

/// Help of `module` with a button back to menu page `page`.
pub fn module_view(app: &App, lang: &str, module: &str, page: usize) -> Option<MenuView> {
    let handlers = app.help.handlers(module)?;
    Some(MenuView {
        text: format_module_help(&app.locales, lang, module, handlers),
        buttons: vec![vec![callback_button(
            app.locales.tr_lang(lang, "help.back_btn"),
            &HelpCallback::Page(page),
        )]],
    })
}

fn not_allowed(app: &App, lang: &str) -> InlineArticle {
    let description = app.locales.tr_lang(lang, "help.not_allowed_desc");
    InlineArticle {
        title: app.locales.tr_lang(lang, "help.not_allowed_title"),
        description: description.clone(),
        view: MenuView {
            text: description,
            buttons: vec![vec![MenuButton::Url {
                text: app.locales.tr_lang(lang, "help.owner_btn"),
                url: format!("tg://user?id={}", app.owner.id),
            }]],
        },
    }
}

/// The article offered for an inline query.
///
/// An empty query or `help` opens the menu; `help <query>` opens the
/// best-matching module.
pub async fn inline_answer(app: &App, sender_id: i64, query: &str) -> InlineArticle {
    let lang = app.locales.language_for(app.store.as_ref(), sender_id).await;
    if !is_allowed(app, sender_id) {
        return not_allowed(app, &lang);
    }

    let query = query.trim();
    let query = if query == "help" {
        ""
    } else {
        query.strip_prefix("help ").map_or(query, str::trim)
    };

    if query.is_empty() {
        return InlineArticle {
            title: app.locales.tr_lang(&lang, "help.menu_title"),
            description: fill(
                &app.locales.tr_lang(&lang, "help.usage_hint"),
                &[("prefix", &app.prefix)],
            ),
            view: menu_page(app, &lang, 0),
        };
    }

    let found = app
        .help
        .lookup(query)
        .and_then(|(module, _)| Some((module, module_view(app, &lang, module, 0)?)));
    match found {
        Some((module, view)) => InlineArticle {
            title: module.to_owned(),
            description: app.locales.tr_lang(&lang, "help.menu_title"),
            view,
        },
        None => {
            let text = app.locales.tr_lang(&lang, "help.module_not_found");
            InlineArticle {
                title: text.clone(),
                description: String::new(),
                view: MenuView {
                    text,
                    buttons: Vec::new(),
                },
            }
        }
    }
}

/// The answer to a button press carrying `data`.
pub async fn callback_reply(app: &App, sender_id: i64, data: &str) -> CallbackReply {
    let lang = app.locales.language_for(app.store.as_ref(), sender_id).await;
    if !is_allowed(app, sender_id) {
        return CallbackReply::Alert(app.locales.tr_lang(&lang, "help.not_allowed_desc"));
    }

    match HelpCallback::parse(data) {
        Some(HelpCallback::Page(page)) => CallbackReply::Edit(menu_page(app, &lang, page)),
        Some(HelpCallback::Module { module, page }) => match module_view(app, &lang, &module, page) {
            Some(view) => CallbackReply::Edit(view),
            None => CallbackReply::Alert(app.locales.tr_lang(&lang, "help.module_not_found")),
        },
        None => CallbackReply::Ignore,
    }
}
