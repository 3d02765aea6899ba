use tdl_core::load_named;

fn main() {
    let tdl_data = r#"
type money = money {amount: float, currency: str}
where amount >= 0

type user = user {name: str, email: str, balance: money}

"${amount}" => money(amount: float(amount), currency: "USD")

john := user(name: "John Doe", email: "john.doe@example.com", balance: "$12.50")
"#;

    match load_named(tdl_data, "example.tdl") {
        Ok(loaded) => {
            let json_output = loaded.to_json().unwrap();
            println!("Successfully loaded TDL to JSON:\n{json_output}");
        }
        Err(e) => {
            eprintln!("Failed to load TDL: {:?}", miette::Report::new(e));
        }
    }
}
