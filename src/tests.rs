#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Datelike, Local};
    use serde_json::json;

    use crate::core::services::{NoReverseMatch, UrlResolver};
    use crate::{
        ArgSpec, Context, Engine, EngineBuilder, FnFilter, Map, ParserError, RenderError, TemplateError, Value,
    };

    #[derive(Debug, Clone)]
    struct DummyUrlResolver;

    impl UrlResolver for DummyUrlResolver {
        fn reverse(
            &self,
            name: &str,
            args: &[Value],
            kwargs: &[(String, Value)],
            current_app: Option<&str>,
        ) -> Result<String, NoReverseMatch> {
            match name {
                "app" => Ok(format!("/{}/", current_app.unwrap_or("none"))),
                "home" => Ok("/home/".to_string()),
                "search" => Ok("/search/?q=1&page=2".to_string()),
                "article" if args.len() == 1 => Ok(format!("/article/{}/", args[0])),
                "user" => match kwargs.iter().find(|(key, _)| key == "name") {
                    Some((_, value)) => Ok(format!("/user/{}/", value)),
                    None => Err(NoReverseMatch(name.to_string())),
                },
                _ => Err(NoReverseMatch(name.to_string())),
            }
        }
    }

    fn init() {
        let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Trace).try_init();
    }

    fn vars(value: serde_json::Value) -> Map {
        match Value::from(value) {
            Value::Map(map) => map.as_ref().clone(),
            _ => Map::new(),
        }
    }

    fn render(source: &str, context: serde_json::Value) -> String {
        Engine::new().render_str(source, &vars(context)).unwrap()
    }

    fn url_engine() -> Engine {
        EngineBuilder::new().url_resolver(Arc::new(DummyUrlResolver)).build().unwrap()
    }

    #[test]
    fn test_variables_and_filters() {
        init();

        let context = json!({"name": "ada", "user": {"tags": ["x", "y"]}, "n": 3});
        assert_eq!(render("Hi {{ name|upper }}!", context.clone()), "Hi ADA!");
        assert_eq!(render("{{ user.tags.1 }}{{ user.tags|length }}", context.clone()), "y2");
        assert_eq!(render("{{ n|add:2 }}", context.clone()), "5");
        assert_eq!(render("[{{ missing }}]", context.clone()), "[]");
        assert_eq!(render(r#"{{ missing|default:"none" }}"#, context), "none");
    }

    #[test]
    fn test_autoescape() {
        init();

        let context = json!({"html": "<b>&</b>"});
        assert_eq!(render("{{ html }}", context.clone()), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(render("{{ html|safe }}", context.clone()), "<b>&</b>");
        assert_eq!(render("{% autoescape off %}{{ html }}{% endautoescape %}", context.clone()), "<b>&</b>");
        assert_eq!(
            render("{% autoescape off %}{% autoescape on %}{{ html }}{% endautoescape %}{% endautoescape %}", context.clone()),
            "&lt;b&gt;&amp;&lt;/b&gt;"
        );
        // literals written in the template are trusted
        assert_eq!(render(r#"{{ "<i>" }}"#, context.clone()), "<i>");
        // escaping never stacks
        assert_eq!(render("{{ html|escape|escape }}", context.clone()), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(render("{{ html|upper }}", context), "&lt;B&gt;&amp;&lt;/B&gt;");

        let engine = EngineBuilder::new().autoescape(false).build().unwrap();
        let output = engine.render_str("{{ html }}", &vars(json!({"html": "<b>"}))).unwrap();
        assert_eq!(output, "<b>");
    }

    #[test]
    fn test_floatformat() {
        init();

        let context = json!({"a": 34.23234, "b": 34.0, "c": 34.26});
        assert_eq!(render("{{ a|floatformat }}", context.clone()), "34.2");
        assert_eq!(render("{{ b|floatformat }}", context.clone()), "34");
        assert_eq!(render("{{ c|floatformat }}", context.clone()), "34.3");
        assert_eq!(render("{{ a|floatformat:3 }}", context.clone()), "34.232");
        assert_eq!(render("{{ b|floatformat:-3 }}", context), "34");
    }

    #[test]
    fn test_for_loop() {
        init();

        let context = json!({
            "items": [1, 2, 3],
            "outer": ["a", "b"],
            "pairs": [["a", 1], ["b", 2]],
            "scores": {"x": 1, "y": 2},
        });
        assert_eq!(
            render(
                "{% for x in items %}{% if forloop.first %}[{% endif %}{{ x }}{% if forloop.last %}]{% else %},{% endif %}{% endfor %}",
                context.clone()
            ),
            "[1,2,3]"
        );
        assert_eq!(render("{% for x in items reversed %}{{ x }}{% endfor %}", context.clone()), "321");
        assert_eq!(
            render("{% for x in items %}{{ forloop.counter0 }}{{ forloop.revcounter }} {% endfor %}", context.clone()),
            "03 12 21 "
        );
        assert_eq!(
            render(
                "{% for o in outer %}{% for x in items %}{{ forloop.parentloop.counter }}{{ x }} {% endfor %}{% endfor %}",
                context.clone()
            ),
            "11 12 13 21 22 23 "
        );
        assert_eq!(render("{% for x in missing %}x{% empty %}none{% endfor %}", context.clone()), "none");
        assert_eq!(render("{% for k, v in pairs %}{{ k }}={{ v }};{% endfor %}", context.clone()), "a=1;b=2;");
        assert_eq!(render("{% for k, v in scores.items %}{{ k }}={{ v }};{% endfor %}", context.clone()), "x=1;y=2;");
        // loop variables do not leak out of the loop
        assert_eq!(render("{% for x in items %}{% endfor %}[{{ x }}{{ forloop }}]", context), "[]");
    }

    #[test]
    fn test_for_loop_unpack_mismatch() {
        init();

        let engine = Engine::new();
        let template = engine.compile("{% for a, b, c in pairs %}{% endfor %}").unwrap();
        let result = template.render(&vars(json!({"pairs": [[1, 2]]})));
        assert!(matches!(result, Err(RenderError::Unpack { expected: 3, found: 2, line: 1 })));

        // strings are single values, not sequences to unpack
        let template = engine.compile("{% for a, b in items %}{{ a }}|{{ b }};{% endfor %}").unwrap();
        let result = template.render(&vars(json!({"items": ["ab", "cd"]})));
        assert!(matches!(result, Err(RenderError::Unpack { expected: 2, found: 1, line: 1 })));
    }

    #[test]
    fn test_ifchanged() {
        init();

        let context = json!({"items": ["a", "a", "b", "b", "b", "c"], "outer": [1, 2], "inner": ["x", "x"]});
        assert_eq!(
            render("{% for x in items %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}", context.clone()),
            "abc"
        );
        assert_eq!(
            render("{% for x in items %}{% ifchanged x %}{{ x }}{% else %}.{% endifchanged %}{% endfor %}", context.clone()),
            "a.b..c"
        );
        // memory starts over on every run of the enclosing loop
        assert_eq!(
            render(
                "{% for o in outer %}{% for x in inner %}{% ifchanged x %}{{ x }}{% endifchanged %}{% endfor %}{% endfor %}",
                context
            ),
            "xx"
        );
    }

    #[test]
    fn test_cycle() {
        init();

        let context = json!({"seven": [1, 2, 3, 4, 5, 6, 7], "four": [1, 2, 3, 4], "three": [1, 2, 3]});
        assert_eq!(
            render("{% for i in seven %}{% cycle 'x' 'y' 'z' %}{% endfor %}", context.clone()),
            "xyzxyzx"
        );
        assert_eq!(
            render(
                "{% for i in four %}{% cycle 'a' 'b' 'c' %}{% if forloop.counter == 2 %}{% resetcycle %}{% endif %}{% endfor %}",
                context.clone()
            ),
            "abab"
        );
        assert_eq!(
            render("{% for i in three %}{% cycle 'odd' 'even' as parity silent %}{{ parity }} {% endfor %}", context.clone()),
            "odd even odd "
        );
        assert_eq!(render("{% cycle 'a' 'b' as v %}-{{ v }}-{% cycle v %}", context), "a-a-b");
    }

    #[test]
    fn test_renders_are_independent() {
        init();

        let engine = Engine::new();
        let template = engine.compile("{% for i in items %}{% cycle 'x' 'y' 'z' %}{% endfor %}").unwrap();
        let context = vars(json!({"items": [1, 2]}));
        assert_eq!(template.render(&context).unwrap(), "xy");
        assert_eq!(template.render(&context).unwrap(), "xy");
    }

    #[test]
    fn test_concurrent_renders_share_nothing() {
        init();

        let engine = Engine::new();
        let template = engine
            .compile(
                "{% for i in items %}{% cycle 'a' 'b' %}{% ifchanged i %}{{ i }}{% endifchanged %}{{ forloop.counter }};{% endfor %}",
            )
            .unwrap();
        let context = vars(json!({"items": [1, 1, 2]}));

        let outputs: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..20).map(|_| template.render(&context).unwrap()).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(outputs.len(), 160);
        assert!(outputs.iter().all(|output| output == "a11;b2;a23;"));
    }

    #[test]
    fn test_with() {
        init();

        let context = json!({"items": [1, 2, 3], "name": "ada"});
        assert_eq!(render("{% with total=items|length %}{{ total }}{% endwith %}[{{ total }}]", context.clone()), "3[]");
        assert_eq!(render("{% with items|length as n %}{{ n }}{% endwith %}", context.clone()), "3");
        assert_eq!(
            render("{% with a=name b=a %}{{ a }}/{{ b }}{% endwith %}", context.clone()),
            "ada/"
        );
        assert_eq!(render("{% with name=\"bo\" %}{{ name }}{% endwith %}{{ name }}", context), "boada");
    }

    #[test]
    fn test_regroup() {
        init();

        let context = json!({"cities": [
            {"name": "Mumbai", "country": "India"},
            {"name": "Calcutta", "country": "India"},
            {"name": "New York", "country": "USA"},
            {"name": "Chicago", "country": "USA"},
            {"name": "Tokyo", "country": "Japan"},
        ]});
        assert_eq!(
            render(
                "{% regroup cities by country as groups %}{% for g in groups %}{{ g.grouper }}:{% for c in g.list %}{{ c.name }},{% endfor %};{% endfor %}",
                context.clone()
            ),
            "India:Mumbai,Calcutta,;USA:New York,Chicago,;Japan:Tokyo,;"
        );
        assert_eq!(
            render(
                "{% regroup cities by country as groups %}{% for country, members in groups %}{{ country }}{{ members|length }} {% endfor %}",
                context
            ),
            "India2 USA2 Japan1 "
        );
        assert_eq!(render("{% regroup missing by x as g %}{{ g|length }}", json!({})), "0");

        // input is not re-sorted, so an interleaved key starts a new group
        let interleaved = json!({"cities": [
            {"name": "Mumbai", "country": "India"},
            {"name": "New York", "country": "USA"},
            {"name": "Calcutta", "country": "India"},
        ]});
        assert_eq!(
            render(
                "{% regroup cities by country as groups %}{% for g in groups %}{{ g.grouper }}:{% for c in g.list %}{{ c.name }},{% endfor %};{% endfor %}",
                interleaved
            ),
            "India:Mumbai,;USA:New York,;India:Calcutta,;"
        );
    }

    #[test]
    fn test_block_tags() {
        init();

        let context = json!({"name": "ada", "n": 5, "flag": false});
        assert_eq!(render("{% filter upper %}hi {{ name }}{% endfilter %}", context.clone()), "HI ADA");
        assert_eq!(
            render("{% spaceless %} <p>\n  <a>x</a>\n </p> {% endspaceless %}", context.clone()),
            "<p><a>x</a></p>"
        );
        assert_eq!(
            render("{% if n > 3 and not flag %}yes{% elif n == 2 %}two{% else %}no{% endif %}", context.clone()),
            "yes"
        );
        assert_eq!(render("{% if n == 2 %}two{% elif n in items %}in{% else %}no{% endif %}", context.clone()), "no");
        assert_eq!(render("{% templatetag openblock %} x {% templatetag closevariable %}", context.clone()), "{% x }}");
        assert_eq!(render("{% verbatim %}{{ name }}{% if %}{% endverbatim %}", context.clone()), "{{ name }}{% if %}");
        assert_eq!(render("a{% comment %}hidden {{ name }}{% endcomment %}b{# note #}c", context), "abc");
    }

    #[test]
    fn test_widthratio_and_firstof() {
        init();

        let context = json!({"value": 175, "max": 200, "a": 0, "b": "", "html": "<b>"});
        assert_eq!(render("{% widthratio value max 100 %}", context.clone()), "88");
        assert_eq!(render("{% widthratio 50 100 10 as w %}[{{ w }}]", context.clone()), "[5]");
        assert_eq!(render("{% widthratio value 0 100 %}", context.clone()), "0");
        assert_eq!(render(r#"{% firstof a b "fallback" %}"#, context.clone()), "fallback");
        assert_eq!(render("{% firstof a html %}", context.clone()), "&lt;b&gt;");
        assert_eq!(render("{% firstof a b as picked %}[{{ picked }}]", context), "[]");

        let template = Engine::new().compile("{% widthratio 1 2 scale %}").unwrap();
        let result = template.render(&vars(json!({"scale": "wide"})));
        assert!(matches!(result, Err(RenderError::WidthRatioScale { line: 1 })));
    }

    #[test]
    fn test_url() {
        init();

        let engine = url_engine();
        let render = |source: &str| engine.render_str(source, &vars(json!({"id": 7})));
        assert_eq!(render("{% url 'home' %}").unwrap(), "/home/");
        assert_eq!(render("{% url 'article' id %}").unwrap(), "/article/7/");
        assert_eq!(render(r#"{% url 'user' name="ada" %}"#).unwrap(), "/user/ada/");
        assert_eq!(render("{% url 'search' %}").unwrap(), "/search/?q=1&amp;page=2");
        assert_eq!(render("{% url 'gone' as link %}[{{ link }}]").unwrap(), "[]");
        assert_eq!(render("{% url 'home' as link %}<{{ link }}>").unwrap(), "</home/>");
        assert!(matches!(
            render("\n{% url 'gone' %}"),
            Err(TemplateError::RenderError(RenderError::NoReverseMatch { line: 2, .. }))
        ));

        let app = |request: serde_json::Value| {
            engine.render_str("{% url 'app' %}", &vars(json!({"request": request}))).unwrap()
        };
        assert_eq!(app(json!({})), "/none/");
        assert_eq!(app(json!({"current_app": "shop"})), "/shop/");
        assert_eq!(app(json!({"resolver_match": {"namespace": "blog"}})), "/blog/");
        assert_eq!(app(json!({"current_app": "shop", "resolver_match": {"namespace": "blog"}})), "/shop/");

        let result = Engine::new().render_str("{% url 'home' %}", &Map::new());
        assert!(matches!(result, Err(TemplateError::RenderError(RenderError::MissingResolver { .. }))));
    }

    #[test]
    fn test_csrf_token_and_now() {
        init();

        assert_eq!(
            render("{% csrf_token %}", json!({"csrf_token": "a\"b"})),
            r#"<input type="hidden" name="csrfmiddlewaretoken" value="a&quot;b">"#
        );
        assert_eq!(
            render("{% with csrf_token=raw|safe %}{% csrf_token %}{% endwith %}", json!({"raw": "a&amp;b"})),
            r#"<input type="hidden" name="csrfmiddlewaretoken" value="a&amp;b">"#
        );
        assert_eq!(render("{% csrf_token %}", json!({"csrf_token": "NOTPROVIDED"})), "");
        assert_eq!(render("{% csrf_token %}", json!({})), "");

        let year = Local::now().year().to_string();
        assert_eq!(render(r#"{% now "Y" %}"#, json!({})), year);
        assert_eq!(render(r#"{% now "Y" as this_year %}={{ this_year }}"#, json!({})), format!("={}", year));
    }

    #[test]
    fn test_lorem_and_text_filters() {
        init();

        assert_eq!(render("{% lorem 3 w %}", json!({})), "lorem ipsum dolor");
        assert!(render("{% lorem %}", json!({})).starts_with("Lorem ipsum dolor sit amet"));
        let html = render("{% lorem n p %}", json!({"n": 2}));
        assert!(html.starts_with("<p>Lorem ipsum"));
        assert_eq!(html.matches("<p>").count(), 2);
        assert_eq!(render("{% lorem 4 w random %}", json!({})).split(' ').count(), 4);

        let context = json!({"bio": "Visit www.example.com & <say> hi"});
        assert_eq!(
            render("{{ bio|urlize }}", context.clone()),
            "Visit <a href=\"http://www.example.com\" rel=\"nofollow\">www.example.com</a> &amp; &lt;say&gt; hi"
        );
        assert_eq!(
            render("{{ bio|urlize|truncatewords_html:2 }}", context),
            "Visit <a href=\"http://www.example.com\" rel=\"nofollow\">www.example.com …</a>"
        );
    }

    #[test]
    fn test_string_if_invalid() {
        init();

        let engine = EngineBuilder::new().string_if_invalid("INVALID(%s)").build().unwrap();
        let output = engine.render_str("{{ missing }}|{{ user.nope }}", &vars(json!({"user": {}}))).unwrap();
        assert_eq!(output, "INVALID(missing)|INVALID(user.nope)");
    }

    #[test]
    fn test_custom_filter() {
        init();

        fn shout(value: Value, _arg: Option<&Value>, _ctx: &Context<'_>) -> Value {
            Value::from(format!("{}!", value.to_str().as_str().to_uppercase()))
        }

        let engine = Engine::new();
        assert!(matches!(engine.compile("{{ name|shout }}"), Err(ParserError::UnknownFilter(_))));
        engine.register_filter(Arc::new(FnFilter::new("shout", ArgSpec::None, shout))).unwrap();
        let output = engine.render_str("{{ name|shout }}", &vars(json!({"name": "<ada>"}))).unwrap();
        assert_eq!(output, "&lt;ADA&gt;!");

        let built = EngineBuilder::new()
            .register_filter(Arc::new(FnFilter::new("shout", ArgSpec::None, shout)))
            .build()
            .unwrap();
        assert_eq!(built.render_str("{{ 'hey'|shout }}", &Map::new()).unwrap(), "HEY!");
    }

    #[test]
    fn test_render_json() {
        init();

        let template = Engine::new().compile("{{ greeting }}, {{ who.name }}").unwrap();
        let output = template.render_json(&json!({"greeting": "Hello", "who": {"name": "ada"}})).unwrap();
        assert_eq!(output, "Hello, ada");
        assert_eq!(template.render_json(&json!([1, 2])).unwrap(), ", ");
    }

    #[test]
    fn test_compile_errors() {
        init();

        let engine = Engine::new();
        let render = |source: &str| engine.render_str(source, &Map::new());
        assert!(matches!(render("{% if %}{% endif %}"), Err(TemplateError::ParserError(_))));
        assert!(matches!(render("{{ _secret }}"), Err(TemplateError::ParserError(ParserError::PrivateAccess(_)))));
        assert!(matches!(
            render("{% for x in y %}"),
            Err(TemplateError::ParserError(ParserError::UnclosedTag { .. }))
        ));
        assert!(matches!(
            render("{% filter safe %}x{% endfilter %}"),
            Err(TemplateError::ParserError(ParserError::DisallowedFilter { .. }))
        ));
        assert!(matches!(
            render("{{ x|truncatewords }}"),
            Err(TemplateError::ParserError(ParserError::FilterArguments { .. }))
        ));
    }
}
